//! Room Resolution Service
//!
//! Maps a pair of participant identities to a stable room identifier,
//! creating the room server-side if absent. Idempotent: the same pair
//! always yields the same room.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::types::{Identity, RoomId};

/// Resolves a participant pair to a room.
#[async_trait]
pub trait RoomResolver: Send + Sync {
    /// Resolve the room for two participants.
    ///
    /// A failure here is fatal to session start - the caller must not
    /// proceed to history loading or channel setup.
    async fn resolve_room(&self, a: &Identity, b: &Identity) -> Result<RoomId>;
}

#[derive(Serialize)]
struct RoomRequest<'a> {
    #[serde(rename = "userIds")]
    user_ids: [&'a str; 2],
}

#[derive(Deserialize)]
struct RoomResponse {
    #[serde(rename = "roomId")]
    room_id: String,
}

/// HTTP-backed room resolver.
pub struct HttpRoomResolver {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRoomResolver {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            http: super::http_client(config),
        }
    }
}

#[async_trait]
impl RoomResolver for HttpRoomResolver {
    async fn resolve_room(&self, a: &Identity, b: &Identity) -> Result<RoomId> {
        let url = format!("{}/api/chat/room", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&RoomRequest {
                user_ids: [a.as_str(), b.as_str()],
            })
            .send()
            .await
            .map_err(|e| ChatError::Resolution(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Resolution(format!(
                "Room endpoint returned {}",
                response.status()
            )));
        }

        let body: RoomResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Resolution(format!("Malformed room response: {}", e)))?;

        debug!(room_id = %body.room_id, "Room resolved");
        Ok(RoomId::new(body.room_id))
    }
}
