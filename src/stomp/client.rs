//! STOMP Client with Automatic Reconnection
//!
//! Single responsibility: maintain a healthy session, reconnecting as
//! needed, and route frames between callers and the broker.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      StompClient                        │
//! │  - subscribe() / publish() / deactivate() via commands  │
//! │  - state observable through a watch channel             │
//! └─────────────────────────────────────────────────────────┘
//!                            │ mpsc
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   supervision loop                      │
//! │  - establishes Sessions, applies the reconnect policy   │
//! │  - owns the sink half; a spawned receiver task owns     │
//! │    the stream half and dispatches MESSAGE frames to     │
//! │    per-subscription channels                            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Reconnection Policy
//!
//! On an unexpected drop while connected, the loop waits `reconnect_delay`
//! and re-enters Connecting. A delay of zero disables reconnection;
//! `max_reconnect_attempts` bounds consecutive failures (0 = unlimited).
//! Subscriptions die with their session: the client does NOT resubscribe -
//! the owning controller must, on the next `Connected` event.
//!
//! Publish and subscribe while not connected are rejected with
//! `ChatError::NotConnected`, never buffered and never silently dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::frame::{Frame, FrameCommand};
use super::session::{disconnect, send_frame, Session, SessionConfig};
use super::transport::WsStream;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use futures_util::StreamExt;

/// Configuration for the STOMP client.
#[derive(Debug, Clone)]
pub struct StompConfig {
    /// WebSocket URL of the STOMP endpoint
    pub url: String,
    /// Timeout for the CONNECT handshake
    pub connect_timeout: Duration,
    /// Delay before auto-retry after an unexpected drop (zero disables)
    pub reconnect_delay: Duration,
    /// Maximum consecutive reconnection attempts (0 = unlimited)
    pub max_reconnect_attempts: u32,
}

impl From<&ChatConfig> for StompConfig {
    fn from(config: &ChatConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            connect_timeout: config.connect_timeout(),
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }
}

/// Connection state, observable via `StompClient::state_watch()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Inactive,
    Connecting,
    Connected,
    Disconnecting,
}

/// Lifecycle events delivered to the owner of the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A session was established. Fired on every (re)connect; prior
    /// subscriptions are invalid and must be re-issued.
    Connected,
    /// The broker sent an ERROR frame.
    StompError { message: String, body: String },
    /// The transport failed or dropped unexpectedly.
    TransportError(String),
    /// The connection is gone (graceful or not).
    Disconnected,
}

/// A live binding to a topic. Dies with its session.
#[derive(Debug)]
pub struct Subscription {
    pub id: String,
    /// Inbound MESSAGE frames for this topic, in arrival order.
    pub frames: mpsc::Receiver<Frame>,
}

enum Command {
    Subscribe {
        destination: String,
        reply: oneshot::Sender<Result<Subscription>>,
    },
    Publish {
        destination: String,
        body: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Deactivate {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running STOMP client.
///
/// Dropping the handle shuts the supervision loop down gracefully.
pub struct StompClient {
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ClientState>,
}

impl StompClient {
    /// Begin the connection attempt. Non-blocking: completion is signaled
    /// by a `ClientEvent::Connected` on the returned event stream.
    pub fn activate(config: StompConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        // Events are unbounded so a slow consumer can never back-pressure
        // the supervision loop into missing a deactivate command.
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::Inactive);

        tokio::spawn(supervision_loop(config, command_rx, state_tx, event_tx));

        (
            Self {
                command_tx,
                state_rx,
            },
            event_rx,
        )
    }

    /// Current connection state.
    pub fn state(&self) -> ClientState {
        *self.state_rx.borrow()
    }

    /// Watch channel for observing state transitions.
    pub fn state_watch(&self) -> watch::Receiver<ClientState> {
        self.state_rx.clone()
    }

    /// Subscribe to a destination. Valid only while connected.
    pub async fn subscribe(&self, destination: &str) -> Result<Subscription> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Subscribe {
                destination: destination.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChatError::NotConnected)?;
        reply_rx.await.map_err(|_| ChatError::NotConnected)?
    }

    /// Publish a body to a destination. Valid only while connected;
    /// rejected with `NotConnected` otherwise.
    pub async fn publish(&self, destination: &str, body: String) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Publish {
                destination: destination.to_string(),
                body,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChatError::NotConnected)?;
        reply_rx.await.map_err(|_| ChatError::NotConnected)?
    }

    /// Initiate graceful shutdown (DISCONNECT frame, then transport close).
    ///
    /// Idempotent - safe to call from any state, including concurrently
    /// with an in-flight connection attempt.
    pub async fn deactivate(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Deactivate { reply: reply_tx })
            .await
            .is_ok()
        {
            // Loop already gone means already inactive
            let _ = reply_rx.await;
        }
    }
}

/// How a connected session ended.
enum SessionExit {
    Deactivated { reply: oneshot::Sender<()> },
    CommandsClosed,
    Dropped(String),
}

async fn supervision_loop(
    config: StompConfig,
    mut command_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ClientState>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
) {
    let session_config = SessionConfig {
        url: config.url.clone(),
        connect_timeout: config.connect_timeout,
    };
    let mut attempts: u32 = 0;

    loop {
        let _ = state_tx.send(ClientState::Connecting);
        info!(url = %config.url, "Connecting to STOMP endpoint");

        // Answer commands while the connect is in flight so that a
        // concurrent deactivate (or an eager publish) never hangs.
        let establish = Session::establish(&session_config);
        tokio::pin!(establish);
        let session = loop {
            tokio::select! {
                result = &mut establish => break result,
                cmd = command_rx.recv() => match cmd {
                    Some(Command::Deactivate { reply }) => {
                        let _ = state_tx.send(ClientState::Inactive);
                        let _ = event_tx.send(ClientEvent::Disconnected);
                        let _ = reply.send(());
                        return;
                    }
                    Some(cmd) => reject_not_connected(cmd),
                    None => {
                        let _ = state_tx.send(ClientState::Inactive);
                        return;
                    }
                },
            }
        };

        match session {
            Ok(session) => {
                attempts = 0;
                let _ = state_tx.send(ClientState::Connected);
                let _ = event_tx.send(ClientEvent::Connected);

                match run_session(session, &mut command_rx, &state_tx, &event_tx).await {
                    SessionExit::Deactivated { reply } => {
                        let _ = state_tx.send(ClientState::Inactive);
                        let _ = event_tx.send(ClientEvent::Disconnected);
                        let _ = reply.send(());
                        return;
                    }
                    SessionExit::CommandsClosed => {
                        let _ = state_tx.send(ClientState::Inactive);
                        return;
                    }
                    SessionExit::Dropped(reason) => {
                        warn!(reason = %reason, "STOMP session dropped");
                        let _ = event_tx.send(ClientEvent::TransportError(reason));
                        let _ = event_tx.send(ClientEvent::Disconnected);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, url = %config.url, "STOMP connect failed");
                let _ = event_tx.send(ClientEvent::TransportError(e.to_string()));
            }
        }

        // Reconnect policy
        if config.reconnect_delay.is_zero() {
            let _ = state_tx.send(ClientState::Inactive);
            return;
        }
        attempts += 1;
        if config.max_reconnect_attempts > 0 && attempts > config.max_reconnect_attempts {
            warn!(
                attempts = attempts - 1,
                "Reconnect attempts exhausted, giving up"
            );
            let _ = state_tx.send(ClientState::Inactive);
            return;
        }

        debug!(delay = ?config.reconnect_delay, attempt = attempts, "Reconnecting after delay");
        let sleep = tokio::time::sleep(config.reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = command_rx.recv() => match cmd {
                    Some(Command::Deactivate { reply }) => {
                        let _ = state_tx.send(ClientState::Inactive);
                        let _ = reply.send(());
                        return;
                    }
                    Some(cmd) => reject_not_connected(cmd),
                    None => {
                        let _ = state_tx.send(ClientState::Inactive);
                        return;
                    }
                },
            }
        }
    }
}

fn reject_not_connected(cmd: Command) {
    match cmd {
        Command::Subscribe { reply, .. } => {
            let _ = reply.send(Err(ChatError::NotConnected));
        }
        Command::Publish { reply, .. } => {
            let _ = reply.send(Err(ChatError::NotConnected));
        }
        Command::Deactivate { reply } => {
            let _ = reply.send(());
        }
    }
}

/// Drive one connected session until it ends.
async fn run_session(
    session: Session,
    command_rx: &mut mpsc::Receiver<Command>,
    state_tx: &watch::Sender<ClientState>,
    event_tx: &mpsc::UnboundedSender<ClientEvent>,
) -> SessionExit {
    let (mut sink, stream) = session.split();

    // Subscriptions for this session only; the map dies with it.
    let subscriptions: Arc<Mutex<HashMap<String, mpsc::Sender<Frame>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let (drop_tx, mut drop_rx) = oneshot::channel::<String>();
    let recv_subs = Arc::clone(&subscriptions);
    let recv_events = event_tx.clone();
    let recv_task = tokio::spawn(async move {
        let reason = receiver_loop(stream, recv_subs, recv_events).await;
        let _ = drop_tx.send(reason);
    });

    let exit = loop {
        tokio::select! {
            reason = &mut drop_rx => {
                break SessionExit::Dropped(
                    reason.unwrap_or_else(|_| "Receiver task failed".to_string()),
                );
            }
            cmd = command_rx.recv() => match cmd {
                None => break SessionExit::CommandsClosed,
                Some(Command::Deactivate { reply }) => break SessionExit::Deactivated { reply },
                Some(Command::Subscribe { destination, reply }) => {
                    let id = format!("sub-{}", Uuid::new_v4());
                    match send_frame(&mut sink, Frame::subscribe(&id, &destination)).await {
                        Ok(()) => {
                            let (frame_tx, frame_rx) = mpsc::channel(64);
                            subscriptions.lock().await.insert(id.clone(), frame_tx);
                            debug!(id = %id, destination = %destination, "Subscribed");
                            let _ = reply.send(Ok(Subscription { id, frames: frame_rx }));
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            let _ = reply.send(Err(e));
                            break SessionExit::Dropped(reason);
                        }
                    }
                }
                Some(Command::Publish { destination, body, reply }) => {
                    match send_frame(&mut sink, Frame::send(&destination, body)).await {
                        Ok(()) => {
                            let _ = reply.send(Ok(()));
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            let _ = reply.send(Err(e));
                            break SessionExit::Dropped(reason);
                        }
                    }
                }
            },
        }
    };

    if matches!(
        exit,
        SessionExit::Deactivated { .. } | SessionExit::CommandsClosed
    ) {
        let _ = state_tx.send(ClientState::Disconnecting);
        disconnect(&mut sink).await;
    }
    recv_task.abort();
    exit
}

/// Read frames off the stream half, dispatching MESSAGE frames to their
/// subscription channel and surfacing ERROR frames as events.
///
/// Returns the reason the stream ended.
async fn receiver_loop(
    mut stream: WsStream,
    subscriptions: Arc<Mutex<HashMap<String, mpsc::Sender<Frame>>>>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
) -> String {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if Frame::is_heartbeat(&text) {
                    continue;
                }
                let frame = match Frame::parse(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Failed to parse inbound frame");
                        continue;
                    }
                };
                match frame.command {
                    FrameCommand::Message => {
                        let Some(id) = frame.get_header("subscription").map(str::to_string)
                        else {
                            warn!("MESSAGE frame without subscription header");
                            continue;
                        };
                        // Clone the sender out so the lock is not held
                        // across the send; a lagging consumer must not
                        // block concurrent subscribes.
                        let frame_tx = subscriptions.lock().await.get(&id).cloned();
                        match frame_tx {
                            Some(frame_tx) => {
                                if frame_tx.send(frame).await.is_err() {
                                    // Receiver gone - subscription abandoned
                                    subscriptions.lock().await.remove(&id);
                                }
                            }
                            None => {
                                debug!(subscription = %id, "MESSAGE for unknown subscription");
                            }
                        }
                    }
                    FrameCommand::Error => {
                        let message =
                            frame.get_header("message").unwrap_or_default().to_string();
                        warn!(message = %message, "Broker ERROR frame");
                        let _ = event_tx.send(ClientEvent::StompError {
                            message,
                            body: frame.body,
                        });
                    }
                    FrameCommand::Receipt => {
                        debug!(
                            receipt = frame.get_header("receipt-id").unwrap_or("?"),
                            "Receipt"
                        );
                    }
                    other => {
                        debug!(command = other.as_str(), "Ignoring frame");
                    }
                }
            }
            Some(Ok(Message::Close(_))) => return "Broker closed connection".to_string(),
            Some(Ok(_)) => continue, // Ping/pong handled by tungstenite
            Some(Err(e)) => return format!("WebSocket error: {}", e),
            None => return "Connection closed".to_string(),
        }
    }
}
