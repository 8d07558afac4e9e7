//! Error types for chatwire

use thiserror::Error;

/// Result type for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Room resolution failed. Fatal to session start - the controller
    /// must not proceed to history loading or channel setup.
    #[error("Room resolution failed: {0}")]
    Resolution(String),

    /// History load failed. Recoverable - the session proceeds without
    /// a backlog.
    #[error("History load failed: {0}")]
    History(String),

    /// User directory lookup failed.
    #[error("User directory lookup failed: {0}")]
    Directory(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An operation that requires a live connection was attempted while
    /// not connected. Never silently dropped.
    #[error("Not connected")]
    NotConnected,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
