//! REST services backing a chat session
//!
//! One-shot request/response calls against the chat backend:
//!
//! | Module    | Endpoint                     | Role                        |
//! |-----------|------------------------------|-----------------------------|
//! | `rooms`   | `POST /api/chat/room`        | Participant pair -> room id |
//! | `history` | `GET /api/messages/{roomId}` | Message backlog             |
//! | `users`   | `GET /api/users`             | Room-selection directory    |
//!
//! `rooms` and `history` are behind traits so the controller can be driven
//! against test doubles; the HTTP implementations share one
//! `reqwest::Client` configuration style.

pub mod history;
pub mod rooms;
pub mod users;

pub use history::{HistoryLoader, HttpHistoryLoader};
pub use rooms::{HttpRoomResolver, RoomResolver};
pub use users::{UserDirectory, UserRecord};

use crate::config::ChatConfig;

/// Build the shared HTTP client with the configured request timeout.
pub(crate) fn http_client(config: &ChatConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .user_agent("chatwire/0.1")
        .build()
        .unwrap_or_default()
}
