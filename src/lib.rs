//! chatwire - realtime chat session client
//!
//! Client-side core of a two-party chat application: resolve a room over
//! HTTP, load the message backlog, open a STOMP-over-WebSocket pub/sub
//! channel, merge live messages with history, and tear everything down
//! cleanly on navigation away. The presentation layer drives this crate;
//! rendering and input belong to it, not here.
//!
//! # Architecture
//!
//! | Module       | Responsibility                                        |
//! |--------------|-------------------------------------------------------|
//! | `stomp`      | Pub/sub protocol client (transport, frames, sessions) |
//! | `rest`       | One-shot HTTP calls: rooms, history, user directory   |
//! | `controller` | The per-room session lifecycle state machine          |
//! | `types`      | Message, identity and room types                      |
//! | `config`     | Injected endpoint/timing configuration                |
//! | `error`      | One error taxonomy for every failure path             |
//!
//! # Usage
//!
//! ```ignore
//! use chatwire::{ChatConfig, ChatSession, HttpHistoryLoader, HttpRoomResolver, Identity};
//!
//! let config = ChatConfig::default();
//! let resolver = HttpRoomResolver::new(&config);
//! let history = HttpHistoryLoader::new(&config);
//!
//! let (session, mut live) = ChatSession::open(
//!     Identity::new("me@example.com"),
//!     Identity::new("peer@example.com"),
//!     &resolver,
//!     &history,
//!     &config,
//! )
//! .await?;
//!
//! session.send("hello").await?;
//! while let Some(message) = live.recv().await {
//!     println!("{}: {}", message.sender, message.content);
//! }
//! session.close().await;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod rest;
pub mod stomp;
pub mod types;

// Re-exports
pub use config::ChatConfig;
pub use controller::{ChatSession, SessionState};
pub use error::{ChatError, Result};
pub use rest::{HistoryLoader, HttpHistoryLoader, HttpRoomResolver, RoomResolver, UserDirectory, UserRecord};
pub use stomp::{ClientEvent, ClientState, StompClient, StompConfig, Subscription};
pub use types::{ChatMessage, Identity, RoomId};
