//! Integration tests for the notification hub subscription.
//!
//! A stub hub is served locally with axum: it answers negotiate, accepts the
//! websocket, checks the protocol handshake and then pushes scripted records.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use grievance_insights::model::Notification;
use grievance_insights::notifications::NotificationCenter;
use grievance_insights::push::{ConnectionState, PushChannel, PushConfig};

const RS: char = '\u{1e}';

/// Records each connection sends after the handshake, indexed by connection number.
/// Connections beyond the script stay open and silent.
#[derive(Clone)]
struct Hub {
    script: Arc<Vec<Vec<String>>>,
    /// Close the socket after sending the script for these connection numbers.
    drop_after: Arc<Vec<usize>>,
    connections: Arc<AtomicUsize>,
    negotiations: Arc<AtomicUsize>,
}

/// A running stub hub.
struct HubHandle {
    url: String,
    connections: Arc<AtomicUsize>,
    negotiations: Arc<AtomicUsize>,
}

fn invocation(message: &str) -> String {
    format!(
        "{}{RS}",
        json!({"type": 1, "target": "ReceiveNotification", "arguments": [message]})
    )
}

async fn negotiate(State(hub): State<Hub>) -> Json<Value> {
    hub.negotiations.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "negotiateVersion": 1,
        "connectionId": "conn",
        "connectionToken": "token-1",
        "availableTransports": [{"transport": "WebSockets", "transferFormats": ["Text", "Binary"]}]
    }))
}

async fn upgrade(ws: WebSocketUpgrade, State(hub): State<Hub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, hub))
}

async fn serve(mut socket: WebSocket, hub: Hub) {
    let index = hub.connections.fetch_add(1, Ordering::SeqCst);

    match socket.recv().await {
        Some(Ok(Message::Text(text))) => {
            let handshake: Value = serde_json::from_str(text.trim_end_matches(RS)).unwrap();
            assert_eq!(handshake["protocol"], "json");
        }
        _ => return,
    }
    if socket.send(Message::Text(format!("{{}}{RS}"))).await.is_err() {
        return;
    }

    if let Some(frames) = hub.script.get(index) {
        for frame in frames {
            if socket.send(Message::Text(frame.clone())).await.is_err() {
                return;
            }
        }
    }

    if hub.drop_after.contains(&index) {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }
}

async fn spawn_hub(script: Vec<Vec<String>>, drop_after: Vec<usize>) -> HubHandle {
    let hub = Hub {
        script: Arc::new(script),
        drop_after: Arc::new(drop_after),
        connections: Arc::new(AtomicUsize::new(0)),
        negotiations: Arc::new(AtomicUsize::new(0)),
    };
    let connections = Arc::clone(&hub.connections);
    let negotiations = Arc::clone(&hub.negotiations);

    let app = Router::new()
        .route("/notificationHub/negotiate", post(negotiate))
        .route("/notificationHub", get(upgrade))
        .with_state(hub);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    HubHandle {
        url: format!("http://{addr}/notificationHub"),
        connections,
        negotiations,
    }
}

fn fast_config(hub_url: &str) -> PushConfig {
    let mut config = PushConfig::new(hub_url);
    config.reconnect_delays = vec![Duration::from_millis(10); 3];
    config
}

async fn wait_for_notifications(center: &NotificationCenter, count: usize) -> Vec<Notification> {
    let result = timeout(Duration::from_secs(5), async {
        loop {
            let active = center.active();
            if active.len() >= count {
                return active;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    tokio_test::assert_ok!(result)
}

#[tokio::test]
async fn test_notifications_arrive_most_recent_first() {
    // two records in one websocket message, then a third on its own
    let burst = format!("{}{}", invocation("Complaint #1 updated"), invocation("Complaint #2 updated"));
    let hub = spawn_hub(vec![vec![burst, invocation("Complaint #3 updated")]], vec![]).await;

    let center = NotificationCenter::new();
    let subscription = center.attach(PushChannel::new(fast_config(&hub.url))).start();

    let active = wait_for_notifications(&center, 3).await;
    let messages: Vec<_> = active.iter().map(|n| n.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "Complaint #3 updated",
            "Complaint #2 updated",
            "Complaint #1 updated"
        ]
    );
    assert_eq!(subscription.state(), ConnectionState::Connected);

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_reconnects_after_drop() {
    let hub = spawn_hub(
        vec![
            vec![invocation("before drop")],
            vec![invocation("after reconnect")],
        ],
        vec![0],
    )
    .await;

    // long enough for the reconnecting state to be observed
    let mut config = fast_config(&hub.url);
    config.reconnect_delays = vec![Duration::from_millis(200); 3];

    let center = NotificationCenter::new();
    let subscription = center.attach(PushChannel::new(config)).start();
    let mut states = subscription.states();

    let reconnecting = timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == ConnectionState::Reconnecting),
    )
    .await
    .is_ok();
    assert!(reconnecting);

    let reconnected = timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .is_ok();
    assert!(reconnected);

    let active = wait_for_notifications(&center, 2).await;
    assert_eq!(active[0].message, "after reconnect");
    assert_eq!(active[1].message, "before drop");
    assert_eq!(hub.connections.load(Ordering::SeqCst), 2);
    assert_eq!(hub.negotiations.load(Ordering::SeqCst), 2);

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_server_close_without_reconnect_stops_channel() {
    let close = format!("{}{RS}", json!({"type": 7, "error": "hub shutting down"}));
    let hub = spawn_hub(vec![vec![close]], vec![]).await;

    let subscription = PushChannel::new(fast_config(&hub.url)).start();
    let mut states = subscription.states();

    let stopped = timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .is_ok();
    assert!(stopped);
    assert_eq!(hub.connections.load(Ordering::SeqCst), 1);

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_unsubscribe_stops_connection() {
    let hub = spawn_hub(vec![], vec![]).await;

    let subscription = PushChannel::new(fast_config(&hub.url)).start();
    let mut states = subscription.states();
    let connected = timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .is_ok();
    assert!(connected);

    subscription.unsubscribe().await;

    assert_eq!(*states.borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unknown_events_and_bad_arguments_are_ignored() {
    let frames = vec![
        format!("{}{RS}", json!({"type": 1, "target": "SomethingElse", "arguments": ["x"]})),
        format!("{}{RS}", json!({"type": 1, "target": "ReceiveNotification", "arguments": [42]})),
        format!("not json{RS}"),
        invocation("valid"),
    ];
    let hub = spawn_hub(vec![frames], vec![]).await;

    let center = NotificationCenter::new();
    let subscription = center.attach(PushChannel::new(fast_config(&hub.url))).start();

    let active = wait_for_notifications(&center, 1).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].message, "valid");

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_skip_negotiation_connects_directly() {
    let hub = spawn_hub(vec![vec![invocation("direct")]], vec![]).await;

    let mut config = fast_config(&hub.url);
    config.skip_negotiation = true;

    let center = NotificationCenter::new();
    let subscription = center.attach(PushChannel::new(config)).start();

    let active = wait_for_notifications(&center, 1).await;
    assert_eq!(active[0].message, "direct");
    assert_eq!(hub.negotiations.load(Ordering::SeqCst), 0);
    assert_eq!(hub.connections.load(Ordering::SeqCst), 1);

    subscription.unsubscribe().await;
}
