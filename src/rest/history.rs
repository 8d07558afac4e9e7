//! Chat History Service
//!
//! Fetches the ordered backlog of messages for a room, oldest first.
//! History is best-effort enrichment: a failure here must not prevent the
//! live channel from opening.

use async_trait::async_trait;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::types::{ChatMessage, RoomId};

/// Loads the message backlog for a room.
#[async_trait]
pub trait HistoryLoader: Send + Sync {
    /// Fetch past messages, oldest first.
    async fn load_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>>;
}

/// HTTP-backed history loader.
pub struct HttpHistoryLoader {
    base_url: String,
    http: reqwest::Client,
}

impl HttpHistoryLoader {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            http: super::http_client(config),
        }
    }
}

#[async_trait]
impl HistoryLoader for HttpHistoryLoader {
    async fn load_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>> {
        let url = format!("{}/api/messages/{}", self.base_url, room);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::History(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::History(format!(
                "History endpoint returned {}",
                response.status()
            )));
        }

        let messages: Vec<ChatMessage> = response
            .json()
            .await
            .map_err(|e| ChatError::History(format!("Malformed history response: {}", e)))?;

        debug!(room = %room, count = messages.len(), "History loaded");
        Ok(messages)
    }
}
