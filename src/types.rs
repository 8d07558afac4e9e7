//! Core chat types
//!
//! Wire shapes match the chat backend's JSON: a message is
//! `{"sender": ..., "content": ..., "timestamp": ...}` with an RFC 3339
//! timestamp, and rooms are addressed by an opaque string key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque participant identifier (an email/username string).
///
/// Supplied externally - never generated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable key scoping a two-party conversation.
///
/// Resolved once per session via the room endpoint; immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Broker topic the session subscribes to for live messages.
    pub fn topic(&self) -> String {
        format!("/topic/chatroom/{}", self.0)
    }

    /// Application destination outbound messages are published to.
    pub fn destination(&self) -> String {
        format!("/app/chatroom/{}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chat message. Immutable once created.
///
/// Produced either by the history endpoint (past messages) or by the live
/// channel (present messages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Identity,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build an outbound message stamped with the current time.
    pub fn now(sender: Identity, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}
