//! STOMP-over-WebSocket Protocol Client
//!
//! This module implements the publish/subscribe channel of a chat session.
//! It is organized by concern, with each submodule having a single
//! responsibility:
//!
//! | Module      | Responsibility                                      |
//! |-------------|-----------------------------------------------------|
//! | `transport` | WebSocket connect/send/receive                      |
//! | `frame`     | STOMP 1.2 text frame encoding and decoding          |
//! | `session`   | An established, handshaken connection               |
//! | `client`    | High-level client with automatic reconnection       |
//!
//! # Key Design Principles
//!
//! ## 1. Make Invalid States Unrepresentable
//!
//! - A `Session` can only be created via `Session::establish()`
//! - `establish()` returns only after the CONNECT handshake completes
//! - If you have a `Session`, you can subscribe and publish
//!
//! ## 2. Subscriptions Die With Their Session
//!
//! The client never resubscribes on reconnect. A `ClientEvent::Connected`
//! after a drop tells the owner that all prior subscriptions are invalid
//! and must be re-issued - that decision belongs to the chat session
//! controller, which knows which topics still matter.
//!
//! ## 3. No Silent Drops
//!
//! Publish or subscribe while not connected fails with
//! `ChatError::NotConnected`; transport failures surface as
//! `ClientEvent::TransportError` before the state settles.

pub mod client;
pub mod frame;
pub mod session;
pub mod transport;

pub use client::{ClientEvent, ClientState, StompClient, StompConfig, Subscription};
pub use frame::{Frame, FrameCommand};
pub use session::{Session, SessionConfig};
pub use transport::Transport;
