//! Chat Session Controller
//!
//! Orchestrates one room visit: resolve room -> load history -> open live
//! channel -> merge incoming messages -> expose send -> close on teardown.
//!
//! # State Machine
//!
//! ```text
//! Idle -> ResolvingRoom -> LoadingHistory -> Connecting -> Live
//!              │                                 ▲          │
//!              ▼ (resolution error)              └──────────┘
//!           Failed                          (drop + reconnect)
//!
//! any of {Connecting, Live} -> Closing -> Closed   (explicit close)
//! ```
//!
//! # Ownership
//!
//! One `ChatSession` owns exactly one protocol client; the transcript is
//! mutated only by the session's event loop. Teardown is structural: once
//! the loop returns, late frames and events have no one left to mutate
//! anything, so no liveness flag is needed.
//!
//! # Ordering
//!
//! History settles (success or failure) before the live channel is
//! activated, so history messages always precede live ones; live messages
//! are appended in arrival order.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::rest::{HistoryLoader, RoomResolver};
use crate::stomp::{ClientEvent, StompClient, StompConfig, Subscription};
use crate::types::{ChatMessage, Identity, RoomId};

/// Lifecycle of one room visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ResolvingRoom,
    LoadingHistory,
    Connecting,
    Live,
    Closing,
    Closed,
    /// Room resolution failed; absorbing.
    Failed,
}

enum SessionCommand {
    Send {
        content: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to one live chat session.
///
/// Created via [`ChatSession::open`]; dropping the handle tears the session
/// down as if [`ChatSession::close`] had been called.
#[derive(Debug)]
pub struct ChatSession {
    room_id: RoomId,
    command_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
    transcript: Arc<RwLock<Vec<ChatMessage>>>,
}

impl ChatSession {
    /// Open a session for a two-participant room.
    ///
    /// Drives the lifecycle up to `Live`: resolves the room (fatal on
    /// failure), loads history (best-effort), connects the protocol client
    /// and subscribes to the room topic. Returns the session handle plus a
    /// stream of live messages in arrival order.
    pub async fn open(
        me: Identity,
        peer: Identity,
        resolver: &dyn RoomResolver,
        history: &dyn HistoryLoader,
        config: &ChatConfig,
    ) -> Result<(Self, mpsc::Receiver<ChatMessage>)> {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        // Step 1: resolve the room. No retry - a failure here is surfaced.
        let _ = state_tx.send(SessionState::ResolvingRoom);
        let room_id = match resolver.resolve_room(&me, &peer).await {
            Ok(room_id) => room_id,
            Err(e) => {
                let _ = state_tx.send(SessionState::Failed);
                return Err(e);
            }
        };
        info!(room = %room_id, "Room resolved");

        // Step 2: load history. The session proceeds either way - a user
        // should still be able to chat when the backlog is unavailable.
        let _ = state_tx.send(SessionState::LoadingHistory);
        let backlog = match history.load_history(&room_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room = %room_id, error = %e, "History unavailable, continuing without backlog");
                Vec::new()
            }
        };

        // Step 3: open the live channel.
        let _ = state_tx.send(SessionState::Connecting);
        let (client, mut events) = StompClient::activate(StompConfig::from(config));
        loop {
            match events.recv().await {
                Some(ClientEvent::Connected) => break,
                Some(ClientEvent::TransportError(reason)) => {
                    debug!(room = %room_id, reason = %reason, "Connect attempt failed");
                }
                Some(_) => continue,
                None => {
                    // Client gave up (reconnect disabled or attempts
                    // exhausted) before we ever went live.
                    let _ = state_tx.send(SessionState::Closed);
                    return Err(ChatError::Transport(
                        "Live channel could not be established".into(),
                    ));
                }
            }
        }

        // Step 4: subscribe to the room topic, then go live.
        let subscription = match client.subscribe(&room_id.topic()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                client.deactivate().await;
                let _ = state_tx.send(SessionState::Closed);
                return Err(e);
            }
        };
        let _ = state_tx.send(SessionState::Live);
        info!(room = %room_id, "Chat session live");

        let transcript = Arc::new(RwLock::new(backlog));
        let (command_tx, command_rx) = mpsc::channel(32);
        let (updates_tx, updates_rx) = mpsc::channel(64);

        tokio::spawn(session_loop(SessionLoop {
            me,
            room_id: room_id.clone(),
            client,
            events,
            subscription: Some(subscription),
            transcript: Arc::clone(&transcript),
            state_tx,
            command_rx,
            updates_tx,
        }));

        Ok((
            Self {
                room_id,
                command_tx,
                state_rx,
                transcript,
            },
            updates_rx,
        ))
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for observing lifecycle transitions.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Snapshot of the displayed sequence: history first, then live
    /// messages in arrival order.
    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.read().await.clone()
    }

    /// Send a message to the room.
    ///
    /// Accepted only while `Live`; rejected with
    /// [`ChatError::NotConnected`] in every other state, so nothing is
    /// ever silently dropped.
    pub async fn send(&self, content: impl Into<String>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Send {
                content: content.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChatError::NotConnected)?;
        reply_rx.await.map_err(|_| ChatError::NotConnected)?
    }

    /// Tear the session down.
    ///
    /// Safe from any state, including while still connecting; idempotent.
    pub async fn close(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(SessionCommand::Close { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

struct SessionLoop {
    me: Identity,
    room_id: RoomId,
    client: StompClient,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    /// None while the connection is down and we have no valid binding.
    subscription: Option<Subscription>,
    transcript: Arc<RwLock<Vec<ChatMessage>>>,
    state_tx: watch::Sender<SessionState>,
    command_rx: mpsc::Receiver<SessionCommand>,
    updates_tx: mpsc::Sender<ChatMessage>,
}

/// Receive on an optional subscription; parks forever when there is none
/// so the select arm simply never fires.
async fn next_live_frame(
    subscription: &mut Option<Subscription>,
) -> Option<crate::stomp::Frame> {
    match subscription {
        Some(sub) => sub.frames.recv().await,
        None => std::future::pending().await,
    }
}

async fn session_loop(mut ctx: SessionLoop) {
    let destination = ctx.room_id.destination();
    let topic = ctx.room_id.topic();

    loop {
        tokio::select! {
            cmd = ctx.command_rx.recv() => match cmd {
                Some(SessionCommand::Send { content, reply }) => {
                    let _ = reply.send(handle_send(&ctx, &destination, content).await);
                }
                Some(SessionCommand::Close { reply }) => {
                    let _ = ctx.state_tx.send(SessionState::Closing);
                    ctx.client.deactivate().await;
                    let _ = ctx.state_tx.send(SessionState::Closed);
                    info!(room = %ctx.room_id, "Chat session closed");
                    let _ = reply.send(());
                    return;
                }
                None => {
                    // Handle dropped: same teardown as an explicit close.
                    let _ = ctx.state_tx.send(SessionState::Closing);
                    ctx.client.deactivate().await;
                    let _ = ctx.state_tx.send(SessionState::Closed);
                    debug!(room = %ctx.room_id, "Session handle dropped, closed");
                    return;
                }
            },

            frame = next_live_frame(&mut ctx.subscription) => match frame {
                Some(frame) => {
                    match serde_json::from_str::<ChatMessage>(&frame.body) {
                        Ok(message) => {
                            ctx.transcript.write().await.push(message.clone());
                            let _ = ctx.updates_tx.send(message).await;
                        }
                        Err(e) => {
                            warn!(room = %ctx.room_id, error = %e, "Discarding unparseable live message");
                        }
                    }
                }
                None => {
                    // Channel gone - the session behind it died. The client
                    // events arm drives reconnection; stop polling here.
                    ctx.subscription = None;
                }
            },

            event = ctx.events.recv() => match event {
                Some(ClientEvent::Connected) => {
                    // Fresh session: previous subscription is invalid.
                    // Re-subscribe before accepting new sends.
                    match ctx.client.subscribe(&topic).await {
                        Ok(subscription) => {
                            ctx.subscription = Some(subscription);
                            let _ = ctx.state_tx.send(SessionState::Live);
                            info!(room = %ctx.room_id, "Reconnected and resubscribed");
                        }
                        Err(e) => {
                            warn!(room = %ctx.room_id, error = %e, "Resubscribe failed");
                        }
                    }
                }
                Some(ClientEvent::TransportError(reason)) => {
                    warn!(room = %ctx.room_id, reason = %reason, "Live channel error");
                }
                Some(ClientEvent::Disconnected) => {
                    if *ctx.state_tx.borrow() == SessionState::Live {
                        ctx.subscription = None;
                        let _ = ctx.state_tx.send(SessionState::Connecting);
                    }
                }
                Some(ClientEvent::StompError { message, .. }) => {
                    warn!(room = %ctx.room_id, message = %message, "Broker error");
                }
                None => {
                    // Protocol client gave up for good.
                    let _ = ctx.state_tx.send(SessionState::Closed);
                    warn!(room = %ctx.room_id, "Live channel lost permanently, session closed");
                    return;
                }
            },
        }
    }
}

async fn handle_send(ctx: &SessionLoop, destination: &str, content: String) -> Result<()> {
    if *ctx.state_tx.borrow() != SessionState::Live {
        return Err(ChatError::NotConnected);
    }
    let message = ChatMessage::now(ctx.me.clone(), content);
    let body = serde_json::to_string(&message)?;
    ctx.client.publish(destination, body).await
}
