//! User Directory Service
//!
//! Lists the backend's known users for the room-selection screen. Each
//! record supplies an identity (email) plus optional display names.

use serde::Deserialize;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::types::Identity;

/// One directory entry.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub email: Identity,
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl UserRecord {
    /// Display name with fallback: full name, then short name, then email.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_else(|| self.email.as_str())
    }
}

/// HTTP-backed user directory.
pub struct UserDirectory {
    base_url: String,
    http: reqwest::Client,
}

impl UserDirectory {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            http: super::http_client(config),
        }
    }

    /// Fetch all user records.
    pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let url = format!("{}/api/users", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::Directory(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Directory(format!(
                "Users endpoint returned {}",
                response.status()
            )));
        }

        let users: Vec<UserRecord> = response
            .json()
            .await
            .map_err(|e| ChatError::Directory(format!("Malformed users response: {}", e)))?;

        debug!(count = users.len(), "User directory loaded");
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallback_chain() {
        let full: UserRecord = serde_json::from_str(
            r#"{"email":"a@x.com","fullName":"Ada Lovelace","name":"ada"}"#,
        )
        .unwrap();
        assert_eq!(full.display_name(), "Ada Lovelace");

        let short: UserRecord = serde_json::from_str(r#"{"email":"a@x.com","name":"ada"}"#).unwrap();
        assert_eq!(short.display_name(), "ada");

        let bare: UserRecord = serde_json::from_str(r#"{"email":"a@x.com"}"#).unwrap();
        assert_eq!(bare.display_name(), "a@x.com");
    }
}
