//! Configuration for chatwire
//!
//! Endpoints are injected here rather than hardcoded in the components;
//! every service takes its URL from a `ChatConfig` resolved at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ChatError, Result};

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the REST backend (room, history, users endpoints)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// WebSocket URL of the STOMP endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Timeout for individual REST requests, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for the CONNECT handshake, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Delay before auto-retry after an unexpected drop, in milliseconds.
    /// 0 disables auto-reconnect.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Maximum reconnection attempts before giving up (0 = unlimited)
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

fn default_api_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            ws_url: default_ws_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: 0,
        }
    }
}

impl ChatConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| ChatError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert_eq!(config.ws_url, "ws://localhost:8080/ws");
        assert_eq!(config.reconnect_delay(), Duration::from_millis(5000));
        assert_eq!(config.max_reconnect_attempts, 0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ChatConfig =
            toml::from_str(r#"api_base_url = "http://chat.example.com""#).unwrap();
        assert_eq!(config.api_base_url, "http://chat.example.com");
        assert_eq!(config.ws_url, "ws://localhost:8080/ws");
        assert_eq!(config.reconnect_delay_ms, 5000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chatwire.toml");
        std::fs::write(
            &path,
            "ws_url = \"ws://10.0.0.5:8080/ws\"\nreconnect_delay_ms = 250\n",
        )
        .unwrap();

        let config = ChatConfig::load(&path).unwrap();
        assert_eq!(config.ws_url, "ws://10.0.0.5:8080/ws");
        assert_eq!(config.reconnect_delay_ms, 250);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = ChatConfig::load(Path::new("/nonexistent/chatwire.toml")).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }
}
