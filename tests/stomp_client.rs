//! Protocol client integration tests against the in-process broker.

mod common;

use chatwire::stomp::{ClientEvent, ClientState, StompClient, StompConfig};
use chatwire::ChatError;
use common::StompBroker;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn config(url: &str, reconnect_ms: u64) -> StompConfig {
    StompConfig {
        url: url.to_string(),
        connect_timeout: Duration::from_secs(5),
        reconnect_delay: Duration::from_millis(reconnect_ms),
        max_reconnect_attempts: 0,
    }
}

async fn wait_connected(events: &mut mpsc::UnboundedReceiver<ClientEvent>) {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(ClientEvent::Connected) => return,
                Some(_) => continue,
                None => panic!("client gave up before connecting"),
            }
        }
    })
    .await
    .expect("timed out waiting for Connected");
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_connect_subscribe_publish_roundtrip() {
    let broker = StompBroker::spawn().await;
    let (client, mut events) = StompClient::activate(config(&broker.url, 0));

    wait_connected(&mut events).await;
    assert_eq!(client.state(), ClientState::Connected);

    let mut sub = client.subscribe("/topic/chatroom/r1").await.unwrap();
    client
        .publish("/topic/chatroom/r1", r#"{"content":"hi"}"#.to_string())
        .await
        .unwrap();

    let frame = timeout(WAIT, sub.frames.recv())
        .await
        .expect("timed out")
        .expect("subscription closed");
    assert_eq!(frame.get_header("destination"), Some("/topic/chatroom/r1"));
    assert_eq!(frame.get_header("subscription"), Some(sub.id.as_str()));
    assert_eq!(frame.body, r#"{"content":"hi"}"#);

    client.deactivate().await;
    assert_eq!(client.state(), ClientState::Inactive);
}

#[tokio::test]
async fn test_app_destination_relayed_to_topic() {
    let broker = StompBroker::spawn().await;
    let (client, mut events) = StompClient::activate(config(&broker.url, 0));
    wait_connected(&mut events).await;

    let mut sub = client.subscribe("/topic/chatroom/r9").await.unwrap();
    client
        .publish("/app/chatroom/r9", r#"{"content":"relayed"}"#.to_string())
        .await
        .unwrap();

    let frame = timeout(WAIT, sub.frames.recv()).await.unwrap().unwrap();
    assert_eq!(frame.body, r#"{"content":"relayed"}"#);

    client.deactivate().await;
}

#[tokio::test]
async fn test_lagging_subscription_does_not_block_subscribe() {
    let broker = StompBroker::spawn().await;
    let (client, mut events) = StompClient::activate(config(&broker.url, 0));
    wait_connected(&mut events).await;

    // Fill the slow subscription's channel well past capacity without
    // draining it, so frame dispatch stalls on it.
    let mut slow = client.subscribe("/topic/chatroom/slow").await.unwrap();
    for i in 0..80 {
        broker
            .publish("/topic/chatroom/slow", &format!(r#"{{"n":{}}}"#, i))
            .await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A new subscription must still go through while dispatch is stalled.
    let mut fresh = timeout(WAIT, client.subscribe("/topic/chatroom/fresh"))
        .await
        .expect("subscribe stalled behind a lagging consumer")
        .unwrap();
    broker.publish("/topic/chatroom/fresh", r#"{"n":-1}"#).await;

    // Draining the slow subscription unblocks dispatch; every frame for
    // both topics then arrives in order.
    for i in 0..80 {
        let frame = timeout(WAIT, slow.frames.recv()).await.unwrap().unwrap();
        assert_eq!(frame.body, format!(r#"{{"n":{}}}"#, i));
    }
    let frame = timeout(WAIT, fresh.frames.recv()).await.unwrap().unwrap();
    assert_eq!(frame.body, r#"{"n":-1}"#);

    client.deactivate().await;
}

// =============================================================================
// Rejection and teardown
// =============================================================================

#[tokio::test]
async fn test_publish_after_deactivate_rejected() {
    let broker = StompBroker::spawn().await;
    let (client, mut events) = StompClient::activate(config(&broker.url, 0));
    wait_connected(&mut events).await;

    client.deactivate().await;

    let err = client
        .publish("/app/chatroom/r1", "{}".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotConnected));
    assert!(broker.sends().await.is_empty(), "nothing may reach the wire");
}

#[tokio::test]
async fn test_connect_failure_without_reconnect_goes_inactive() {
    common::init_tracing();
    // No listener on this port; reconnect disabled.
    let (client, mut events) = StompClient::activate(config("ws://127.0.0.1:9", 0));

    let saw_error = timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(ClientEvent::TransportError(_)) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await
    .expect("timed out");
    assert!(saw_error);

    // Channel closing means the supervision loop exited.
    timeout(WAIT, async { while events.recv().await.is_some() {} })
        .await
        .expect("supervision loop did not exit");
    assert_eq!(client.state(), ClientState::Inactive);

    let err = client.subscribe("/topic/x").await.unwrap_err();
    assert!(matches!(err, ChatError::NotConnected));
}

#[tokio::test]
async fn test_deactivate_is_idempotent() {
    let broker = StompBroker::spawn().await;
    let (client, mut events) = StompClient::activate(config(&broker.url, 0));
    wait_connected(&mut events).await;

    client.deactivate().await;
    // Second call must return promptly, not hang or panic.
    timeout(WAIT, client.deactivate())
        .await
        .expect("second deactivate hung");
    assert_eq!(client.state(), ClientState::Inactive);
}

#[tokio::test]
async fn test_deactivate_during_connect_attempt() {
    common::init_tracing();
    // A TCP listener that never completes the WebSocket upgrade keeps the
    // connect attempt in flight.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let _hold = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            held.push(stream);
        }
    });

    let (client, _events) = StompClient::activate(StompConfig {
        url,
        connect_timeout: Duration::from_secs(30),
        reconnect_delay: Duration::from_millis(100),
        max_reconnect_attempts: 0,
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    timeout(WAIT, client.deactivate())
        .await
        .expect("deactivate during connect hung");
    assert_eq!(client.state(), ClientState::Inactive);
}

// =============================================================================
// Reconnection
// =============================================================================

#[tokio::test]
async fn test_reconnect_after_drop_invalidates_subscriptions() {
    let broker = StompBroker::spawn().await;
    let (client, mut events) = StompClient::activate(config(&broker.url, 100));
    wait_connected(&mut events).await;

    let mut sub = client.subscribe("/topic/chatroom/r1").await.unwrap();

    broker.drop_connections();

    // The drop surfaces before the state settles, then the client comes back.
    let mut saw_transport_error = false;
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(ClientEvent::TransportError(_)) => saw_transport_error = true,
                Some(ClientEvent::Connected) => return,
                Some(_) => continue,
                None => panic!("client gave up instead of reconnecting"),
            }
        }
    })
    .await
    .expect("timed out waiting for reconnect");
    assert!(saw_transport_error);
    assert_eq!(broker.connection_count(), 2);

    // The old subscription died with its session.
    let gone = timeout(WAIT, sub.frames.recv()).await.expect("timed out");
    assert!(gone.is_none(), "old subscription must be invalidated");

    // A fresh subscription on the new session works.
    let mut sub2 = client.subscribe("/topic/chatroom/r1").await.unwrap();
    broker.publish("/topic/chatroom/r1", r#"{"content":"back"}"#).await;
    let frame = timeout(WAIT, sub2.frames.recv()).await.unwrap().unwrap();
    assert_eq!(frame.body, r#"{"content":"back"}"#);

    client.deactivate().await;
}

#[tokio::test]
async fn test_bounded_reconnect_attempts_exhaust() {
    common::init_tracing();
    let (client, mut events) = StompClient::activate(StompConfig {
        url: "ws://127.0.0.1:9".to_string(),
        connect_timeout: Duration::from_secs(1),
        reconnect_delay: Duration::from_millis(20),
        max_reconnect_attempts: 2,
    });

    // Events channel closes once the loop gives up.
    timeout(WAIT, async { while events.recv().await.is_some() {} })
        .await
        .expect("client never gave up");
    assert_eq!(client.state(), ClientState::Inactive);
}
