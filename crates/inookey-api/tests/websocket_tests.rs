//! End-to-end WebSocket tests against a server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use inookey_api::routes::SHUTDOWN_NOTICE;
use inookey_api::{create_router, serve};
use inookey_api::state::AppState;
use inookey_chat::gateway::testing::ScriptedBackend;
use inookey_chat::ModelGateway;
use inookey_core::config::InookeyConfig;
use inookey_storage::Database;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (AppState, String, JoinHandle<()>) {
    let backend = Arc::new(ScriptedBackend::new("Thanks for reaching out!"));
    let gateway = Arc::new(ModelGateway::new(backend, Duration::from_secs(2), true));
    gateway.initialize().await.unwrap();
    let db = Arc::new(Database::in_memory().unwrap());
    let state = AppState::new(InookeyConfig::default(), db, gateway);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (state, format!("ws://{}/ws", addr), server)
}

async fn connect(url: &str) -> Client {
    let (ws, _) = connect_async(url).await.expect("WebSocket connect failed");
    ws
}

async fn emit(ws: &mut Client, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data}).to_string();
    ws.send(Message::Text(frame)).await.unwrap();
}

/// Next frame, parsed as a JSON event.
async fn next_event(ws: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended")
        .expect("receive error");
    serde_json::from_str(&msg.into_text().unwrap()).unwrap()
}

/// Round-trip a ping so the server has definitely registered the socket.
async fn sync(ws: &mut Client) {
    ws.send(Message::Text(json!({"event": "ping"}).to_string()))
        .await
        .unwrap();
    let pong = next_event(ws).await;
    assert_eq!(pong["event"], "pong");
}

#[tokio::test]
async fn test_ping_pong() {
    let (_state, url, server) = start_server().await;
    let mut ws = connect(&url).await;

    ws.send(Message::Text(json!({"event": "ping"}).to_string()))
        .await
        .unwrap();
    let pong = next_event(&mut ws).await;
    assert_eq!(pong["event"], "pong");
    assert!(pong["data"]["timestamp"].is_string());

    emit(&mut ws, "ping", json!({})).await;
    let pong = next_event(&mut ws).await;
    assert_eq!(pong["event"], "pong");

    server.abort();
}

#[tokio::test]
async fn test_init_session_and_chat() {
    let (state, url, server) = start_server().await;
    let mut ws = connect(&url).await;

    emit(
        &mut ws,
        "init_session",
        json!({"sessionId": "ws-visitor", "userAgent": "widget/1.0"}),
    )
    .await;
    let init = next_event(&mut ws).await;
    assert_eq!(init["event"], "session_initialized");
    assert_eq!(init["data"]["sessionId"], "ws-visitor");

    emit(
        &mut ws,
        "chat_message",
        json!({"message": "Do you offer ongoing support?", "conversationHistory": []}),
    )
    .await;
    let reply = next_event(&mut ws).await;
    assert_eq!(reply["event"], "ai_response");
    assert_eq!(reply["data"]["response"], "Thanks for reaching out!");
    assert_eq!(reply["data"]["sessionId"], "ws-visitor");
    assert_eq!(reply["data"]["suggestions"].as_array().unwrap().len(), 3);

    let history = state.chat.history("ws-visitor", None).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_message, "Do you offer ongoing support?");

    let stats = state.connections.stats().await;
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.connections[0].session_id.as_deref(), Some("ws-visitor"));

    server.abort();
}

#[tokio::test]
async fn test_invalid_frames_keep_connection_open() {
    let (_state, url, server) = start_server().await;
    let mut ws = connect(&url).await;

    ws.send(Message::Text("garbage".to_string())).await.unwrap();
    let err = next_event(&mut ws).await;
    assert_eq!(err["event"], "error");

    emit(&mut ws, "chat_message", json!({"message": ""})).await;
    let err = next_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["message"], "Failed to process message");

    sync(&mut ws).await;
    server.abort();
}

#[tokio::test]
async fn test_typing_and_offline_broadcasts() {
    let (_state, url, server) = start_server().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    emit(&mut alice, "init_session", json!({"sessionId": "alice"})).await;
    assert_eq!(next_event(&mut alice).await["event"], "session_initialized");
    sync(&mut bob).await;

    emit(&mut alice, "typing_start", json!({})).await;
    let typing = next_event(&mut bob).await;
    assert_eq!(typing["event"], "user_typing");
    assert_eq!(typing["data"]["sessionId"], "alice");
    assert_eq!(typing["data"]["isTyping"], true);

    emit(&mut alice, "user_present", json!({"status": "away"})).await;
    let presence = next_event(&mut bob).await;
    assert_eq!(presence["event"], "user_status");
    assert_eq!(presence["data"]["status"], "away");

    alice.close(None).await.unwrap();
    let offline = next_event(&mut bob).await;
    assert_eq!(offline["event"], "user_status");
    assert_eq!(offline["data"]["sessionId"], "alice");
    assert_eq!(offline["data"]["status"], "offline");

    server.abort();
}

#[tokio::test]
async fn test_inactivity_sweep_closes_socket() {
    let (state, url, server) = start_server().await;
    let mut ws = connect(&url).await;
    sync(&mut ws).await;
    assert_eq!(state.connections.len().await, 1);

    let later = Utc::now() + chrono::Duration::minutes(6);
    let evicted = state
        .connections
        .sweep_inactive(later, Duration::from_secs(5 * 60))
        .await;
    assert_eq!(evicted.len(), 1);
    assert!(state.connections.is_empty().await);

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);

    server.abort();
}

#[tokio::test]
async fn test_shutdown_is_announced_to_sockets() {
    let backend = Arc::new(ScriptedBackend::new("unused"));
    let gateway = Arc::new(ModelGateway::new(backend, Duration::from_secs(2), true));
    gateway.initialize().await.unwrap();
    let db = Arc::new(Database::in_memory().unwrap());
    let state = AppState::new(InookeyConfig::default(), db, gateway);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, state, async move {
        let _ = stop_rx.await;
    }));

    let mut ws = connect(&url).await;
    sync(&mut ws).await;

    stop_tx.send(()).unwrap();
    let notice = next_event(&mut ws).await;
    assert_eq!(notice["event"], "system_message");
    assert_eq!(notice["data"]["message"], SHUTDOWN_NOTICE);
    assert_eq!(notice["data"]["type"], "shutdown");

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
