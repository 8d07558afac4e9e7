//! WebSocket Transport Layer
//!
//! Single responsibility: connect to a WebSocket and send/receive text
//! messages. No knowledge of STOMP framing, subscriptions, or session
//! management.

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{http::Request, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::error::{ChatError, Result};

/// Type alias for the WebSocket send half
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Type alias for the WebSocket receive half
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// A connected WebSocket transport.
///
/// Represents a raw duplex connection with no protocol knowledge.
/// Can only be constructed via `Transport::connect()`.
pub struct Transport {
    sink: WsSink,
    stream: WsStream,
}

impl Transport {
    /// Connect to a WebSocket endpoint.
    ///
    /// Returns a Transport only when the connection is established.
    pub async fn connect(url: &str) -> Result<Self> {
        debug!(url = %url, "Connecting to WebSocket");

        let request = Request::builder()
            .uri(url)
            .header("Host", extract_host(url))
            .header("Origin", origin(url))
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .map_err(|e| ChatError::Transport(format!("Failed to build request: {}", e)))?;

        let (ws, _) = connect_async_with_config(request, None, false)
            .await
            .map_err(|e| ChatError::Transport(format!("WebSocket connect failed: {}", e)))?;

        let (sink, stream) = ws.split();

        debug!(url = %url, "WebSocket connected");
        Ok(Self { sink, stream })
    }

    /// Send a text message.
    pub async fn send(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to send: {}", e)))
    }

    /// Receive the next text message.
    ///
    /// Returns None if the connection is closed.
    /// Skips non-text messages (ping/pong handled automatically).
    pub async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Ping(_))) => {
                    // Pong is handled automatically by tungstenite
                    continue;
                }
                Some(Ok(_)) => continue, // Skip binary, pong, frame messages
                Some(Err(e)) => {
                    return Err(ChatError::Transport(format!("WebSocket error: {}", e)))
                }
                None => return Ok(None), // Stream ended
            }
        }
    }

    /// Split into separate sink and stream for concurrent send/receive.
    pub fn split(self) -> (WsSink, WsStream) {
        (self.sink, self.stream)
    }
}

/// Extract host from URL for Host header
fn extract_host(url: &str) -> &str {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("localhost")
}

/// Origin header for the upgrade request: the endpoint's host under the
/// matching HTTP scheme (wss -> https, ws -> http).
fn origin(url: &str) -> String {
    let scheme = if url.starts_with("wss://") {
        "https"
    } else {
        "http"
    };
    format!("{}://{}", scheme, extract_host(url))
}

/// Host for the STOMP CONNECT `host` header, without the port.
pub(crate) fn virtual_host(url: &str) -> &str {
    extract_host(url).split(':').next().unwrap_or("localhost")
}
