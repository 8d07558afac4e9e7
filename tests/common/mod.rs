//! In-process STOMP broker for integration tests.
//!
//! Speaks just enough STOMP over tokio-tungstenite's server side to drive
//! the client: CONNECT -> CONNECTED, SUBSCRIBE registry, SEND fan-out, and
//! server-originated publishes. SEND destinations under `/app/` are also
//! relayed to the matching `/topic/` destination, mirroring the chat
//! backend's relay behavior.

use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

static TRACING: Once = Once::new();

/// Install a log subscriber honoring `RUST_LOG`, once per test binary.
///
/// Diagnostics are opt-in: `RUST_LOG=chatwire=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct StompBroker {
    pub url: String,
    state: Arc<BrokerState>,
    kill_tx: broadcast::Sender<()>,
}

struct BrokerState {
    /// destination -> [(subscription id, connection outbox)]
    subscribers: Mutex<HashMap<String, Vec<(String, mpsc::UnboundedSender<Message>)>>>,
    /// Every SEND frame the broker has received, as (destination, body).
    sends: Mutex<Vec<(String, String)>>,
    connections: AtomicUsize,
    subscriptions: AtomicUsize,
    next_message_id: AtomicUsize,
}

impl StompBroker {
    pub async fn spawn() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let state = Arc::new(BrokerState {
            subscribers: Mutex::new(HashMap::new()),
            sends: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            subscriptions: AtomicUsize::new(0),
            next_message_id: AtomicUsize::new(1),
        });
        let (kill_tx, _) = broadcast::channel(8);

        let accept_state = Arc::clone(&state);
        let accept_kill = kill_tx.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let state = Arc::clone(&accept_state);
                let kill_rx = accept_kill.subscribe();
                tokio::spawn(handle_connection(state, stream, kill_rx));
            }
        });

        Self {
            url,
            state,
            kill_tx,
        }
    }

    /// Total connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Total SUBSCRIBE frames seen so far.
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions.load(Ordering::SeqCst)
    }

    /// Every SEND frame received so far, as (destination, body).
    pub async fn sends(&self) -> Vec<(String, String)> {
        self.state.sends.lock().await.clone()
    }

    /// Abruptly drop every open connection (simulates a transport failure).
    pub fn drop_connections(&self) {
        let _ = self.kill_tx.send(());
    }

    /// Server-originated MESSAGE delivery to a destination's subscribers.
    pub async fn publish(&self, destination: &str, body: &str) {
        deliver(&self.state, destination, body).await;
    }
}

async fn deliver(state: &BrokerState, destination: &str, body: &str) {
    let subs = state.subscribers.lock().await;
    if let Some(list) = subs.get(destination) {
        for (sub_id, outbox) in list {
            let message_id = state.next_message_id.fetch_add(1, Ordering::SeqCst);
            let frame = format!(
                "MESSAGE\ndestination:{}\nmessage-id:{}\nsubscription:{}\n\n{}\0",
                destination, message_id, sub_id, body
            );
            let _ = outbox.send(Message::Text(frame));
        }
    }
}

/// Deliver to the destination and, for `/app/...` sends, to the matching
/// `/topic/...` subscribers (the backend's relay).
async fn route(state: &BrokerState, destination: &str, body: &str) {
    deliver(state, destination, body).await;
    if let Some(rest) = destination.strip_prefix("/app/") {
        deliver(state, &format!("/topic/{}", rest), body).await;
    }
}

async fn handle_connection(
    state: Arc<BrokerState>,
    stream: TcpStream,
    mut kill_rx: broadcast::Receiver<()>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    let (mut sink, mut recv) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = kill_rx.recv() => break,
            msg = recv.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    let (command, headers, body) = parse_frame(&text);
                    match command.as_str() {
                        "CONNECT" => {
                            let _ = out_tx.send(Message::Text(
                                "CONNECTED\nversion:1.2\n\n\0".to_string(),
                            ));
                        }
                        "SUBSCRIBE" => {
                            let id = headers.get("id").cloned().unwrap_or_default();
                            let dest =
                                headers.get("destination").cloned().unwrap_or_default();
                            state
                                .subscribers
                                .lock()
                                .await
                                .entry(dest)
                                .or_default()
                                .push((id, out_tx.clone()));
                            state.subscriptions.fetch_add(1, Ordering::SeqCst);
                        }
                        "SEND" => {
                            let dest =
                                headers.get("destination").cloned().unwrap_or_default();
                            state.sends.lock().await.push((dest.clone(), body.clone()));
                            route(&state, &dest, &body).await;
                        }
                        "DISCONNECT" => break,
                        _ => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            },
        }
    }

    // Prune this connection's subscriptions
    let mut subs = state.subscribers.lock().await;
    for list in subs.values_mut() {
        list.retain(|(_, tx)| !tx.same_channel(&out_tx));
    }
    writer.abort();
}

/// Minimal frame split: command line, header map, body.
fn parse_frame(text: &str) -> (String, HashMap<String, String>, String) {
    let text = text.strip_suffix('\0').unwrap_or(text);
    let (head, body) = text.split_once("\n\n").unwrap_or((text, ""));
    let mut lines = head.lines();
    let command = lines.next().unwrap_or_default().to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.to_string(), value.to_string());
        }
    }
    (command, headers, body.to_string())
}
