//! End-to-end tests over real WebSocket connections: echo, authentication,
//! departure notices and the connection limit.

use futures_util::{SinkExt, StreamExt};
use parley_core::{JwtAuthenticator, UserRecord};
use parley_server::config::Config;
use parley_server::handlers::{build_router, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "e2e-test-secret";

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.secret = SECRET.to_string();
    config.metrics.enabled = false;
    config.users = vec![
        UserRecord::new("alice")
            .with_id(1)
            .with_email("alice@example.com"),
        UserRecord::new("bob").with_uid("ext-bob"),
    ];
    config
}

/// Start the server on a random port.
async fn start_test_server(config: Config) -> (Arc<AppState>, SocketAddr) {
    let state = Arc::new(AppState::new(config));
    let app = build_router(Arc::clone(&state));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (state, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let url = format!("ws://{}/ws/chat", addr);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket");
    ws
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timed out waiting for a message")
            .expect("Connection closed")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected message: {:?}", other),
        }
    }
}

async fn next_json(ws: &mut Client) -> Value {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

/// Round-trip one echo so the server has registered the connection.
async fn sync(ws: &mut Client) {
    let probe = json!({"type": "ping", "n": 0});
    send_json(ws, probe.clone()).await;
    assert_eq!(next_json(ws).await, probe);
}

fn token_for(subject: &str) -> String {
    JwtAuthenticator::new(SECRET.as_bytes(), Duration::from_secs(60))
        .issue(subject)
        .unwrap()
}

#[tokio::test]
async fn test_relay_message_is_echoed() {
    let (_state, addr) = start_test_server(test_config()).await;
    let mut ws = connect(addr).await;

    let raw = r#"{"type":"chat","text":"hi"}"#;
    ws.send(Message::Text(raw.to_string())).await.unwrap();

    let echoed = next_text(&mut ws).await;
    assert_eq!(
        serde_json::from_str::<Value>(&echoed).unwrap(),
        json!({"type": "chat", "text": "hi"})
    );
}

#[tokio::test]
async fn test_messages_processed_in_order() {
    let (_state, addr) = start_test_server(test_config()).await;
    let mut ws = connect(addr).await;

    for n in 0..20 {
        send_json(&mut ws, json!({"type": "chat", "n": n})).await;
    }
    for n in 0..20 {
        assert_eq!(next_json(&mut ws).await["n"], n);
    }
}

#[tokio::test]
async fn test_malformed_message_keeps_connection_open() {
    let (_state, addr) = start_test_server(test_config()).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(
        next_json(&mut ws).await,
        json!({"result": false, "error": true, "message": "Invalid message format", "data": null})
    );

    sync(&mut ws).await;
}

#[tokio::test]
async fn test_departure_is_announced() {
    let (state, addr) = start_test_server(test_config()).await;
    let mut c1 = connect(addr).await;
    let mut c2 = connect(addr).await;
    sync(&mut c1).await;
    sync(&mut c2).await;
    assert_eq!(state.gateway.registry().len(), 2);

    c1.close(None).await.unwrap();

    assert_eq!(next_text(&mut c2).await, "127.0.0.1 left the chat");
    assert_eq!(state.gateway.registry().len(), 1);
}

#[tokio::test]
async fn test_empty_token_rejected() {
    let (state, addr) = start_test_server(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, json!({"type": "auth", "token": ""})).await;
    assert_eq!(
        next_json(&mut ws).await,
        json!({"result": false, "error": true, "message": "Invalid token", "data": null})
    );

    assert_eq!(state.gateway.registry().stats().bound_count, 0);
}

#[tokio::test]
async fn test_auth_binds_identity() {
    let (state, addr) = start_test_server(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, json!({"type": "auth", "token": token_for("alice")})).await;
    assert_eq!(
        next_json(&mut ws).await,
        json!({
            "result": true,
            "error": false,
            "message": "",
            "data": {"uid": "1", "username": "alice", "email": "alice@example.com"}
        })
    );

    assert!(state.gateway.registry().lookup_by_identity("1").is_some());

    // Still a normal connection afterwards
    sync(&mut ws).await;
}

#[tokio::test]
async fn test_unknown_user_rejected() {
    let (state, addr) = start_test_server(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, json!({"type": "auth", "token": token_for("mallory")})).await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["message"], "Invalid token or user not found");
    assert_eq!(reply["data"], Value::Null);

    assert_eq!(state.gateway.registry().stats().bound_count, 0);
}

#[tokio::test]
async fn test_connection_limit() {
    let mut config = test_config();
    config.limits.max_connections = 1;
    let (_state, addr) = start_test_server(config).await;

    let mut first = connect(addr).await;
    sync(&mut first).await;

    let url = format!("ws://{}/ws/chat", addr);
    match tokio_tungstenite::connect_async(&url).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 503),
        other => panic!("Expected 503, got {:?}", other.map(|(_, r)| r.status())),
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_state, addr) = start_test_server(test_config()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /health HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        addr
    );
    tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes())
        .await
        .unwrap();

    let mut response = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
        .await
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""status":"healthy""#));
}
