//! STOMP Session
//!
//! Single responsibility: an established, handshaken connection to the
//! broker.
//!
//! A `Session` can ONLY be created via `Session::establish()`, which:
//! 1. Connects the WebSocket transport
//! 2. Sends the CONNECT frame
//! 3. Waits for CONNECTED (or fails on ERROR/close/timeout)
//! 4. Only THEN returns a Session
//!
//! This makes it impossible to hold a session that isn't ready: if you have
//! a `Session`, you can subscribe and publish on it.
//!
//! Sessions do NOT reconnect. If the connection dies, the session is gone;
//! `StompClient` owns the reconnection policy.

use futures_util::SinkExt;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use super::frame::{Frame, FrameCommand};
use super::transport::{virtual_host, Transport, WsSink, WsStream};
use crate::error::{ChatError, Result};

/// Configuration for establishing a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the STOMP endpoint
    pub url: String,
    /// Timeout for the CONNECT handshake
    pub connect_timeout: Duration,
}

/// An established STOMP session.
pub struct Session {
    sink: WsSink,
    stream: WsStream,
}

impl Session {
    /// Establish a new session.
    ///
    /// Blocks until the CONNECT handshake completes. If any step fails, an
    /// error is returned and no session exists.
    pub async fn establish(config: &SessionConfig) -> Result<Self> {
        let mut transport = timeout(config.connect_timeout, Transport::connect(&config.url))
            .await
            .map_err(|_| ChatError::Timeout("WebSocket connect".into()))??;

        let connect = Frame::connect(virtual_host(&config.url));
        transport.send(connect.serialize()).await?;

        let reply = timeout(config.connect_timeout, handshake_reply(&mut transport))
            .await
            .map_err(|_| ChatError::Timeout("CONNECT handshake".into()))??;

        match reply.command {
            FrameCommand::Connected => {
                debug!(
                    url = %config.url,
                    version = reply.get_header("version").unwrap_or("?"),
                    "STOMP session established"
                );
            }
            FrameCommand::Error => {
                return Err(ChatError::Protocol(format!(
                    "Broker rejected CONNECT: {}",
                    reply.get_header("message").unwrap_or("no message")
                )));
            }
            other => {
                return Err(ChatError::Protocol(format!(
                    "Unexpected {} during handshake",
                    other.as_str()
                )));
            }
        }

        let (sink, stream) = transport.split();
        Ok(Self { sink, stream })
    }

    /// Split into send and receive halves for concurrent use.
    pub fn split(self) -> (WsSink, WsStream) {
        (self.sink, self.stream)
    }
}

/// Read frames until something other than a heart-beat arrives.
async fn handshake_reply(transport: &mut Transport) -> Result<Frame> {
    loop {
        match transport.recv().await? {
            Some(text) if Frame::is_heartbeat(&text) => continue,
            Some(text) => return Frame::parse(&text),
            None => {
                return Err(ChatError::Transport(
                    "Connection closed during handshake".into(),
                ))
            }
        }
    }
}

/// Send one frame over the session's sink half.
pub(crate) async fn send_frame(sink: &mut WsSink, frame: Frame) -> Result<()> {
    sink.send(Message::Text(frame.serialize()))
        .await
        .map_err(|e| ChatError::Transport(format!("Failed to send frame: {}", e)))
}

/// Graceful shutdown: DISCONNECT frame, then transport close.
///
/// Failures are logged, not surfaced - the connection is going away either
/// way.
pub(crate) async fn disconnect(sink: &mut WsSink) {
    if let Err(e) = send_frame(sink, Frame::disconnect()).await {
        warn!(error = %e, "Failed to send DISCONNECT frame");
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "WebSocket close failed");
    }
}
