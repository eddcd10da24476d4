//! End-to-end tests against a real listener: WebSocket push channel via
//! `tokio-tungstenite`, request API via `reqwest`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bridge_server::metrics::detached_handle;
use bridge_server::{BridgeServer, ServerConfig};
use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    server: Arc<BridgeServer>,
    addr: SocketAddr,
    http: reqwest::Client,
}

impl TestServer {
    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.http.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self.http.post(self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

/// Boot a test server on an auto-assigned port.
async fn boot_server() -> TestServer {
    boot_with(ServerConfig::default()).await
}

async fn boot_with(config: ServerConfig) -> TestServer {
    let server = Arc::new(BridgeServer::new(config, detached_handle()));
    let (addr, _handle) = server.listen().await.unwrap();
    TestServer {
        server,
        addr,
        http: reqwest::Client::new(),
    }
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read messages until one of the given type arrives.
async fn read_until_type(ws: &mut WsStream, message_type: &str) -> Value {
    loop {
        let msg = read_json(ws).await;
        if msg["type"] == message_type {
            return msg;
        }
    }
}

/// Read until the server closes the socket. Returns the close code.
async fn read_close_code(ws: &mut WsStream) -> Option<u16> {
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("timeout waiting for close") {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return None,
        }
    }
}

/// Assert that nothing arrives for a short while.
async fn assert_silent(ws: &mut WsStream) {
    let res = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(res.is_err(), "unexpected frame: {res:?}");
}

/// Connect and handshake. Returns the socket and its `HANDSHAKE_ACK`.
async fn join(server: &TestServer, session_id: Option<&str>, role: &str) -> (WsStream, Value) {
    let mut ws = connect(&server.ws_url()).await;
    let mut handshake = json!({"type": "HANDSHAKE", "role": role, "clientName": format!("{role}-client")});
    if let Some(id) = session_id {
        handshake["sessionId"] = json!(id);
    }
    send_json(&mut ws, handshake).await;
    let ack = read_json(&mut ws).await;
    assert_eq!(ack["type"], "HANDSHAKE_ACK");
    let connected = read_json(&mut ws).await;
    assert_eq!(connected["type"], "CLIENT_CONNECTED");
    (ws, ack)
}

#[tokio::test]
async fn api_create_push_and_read_events() {
    let t = boot_server().await;

    let (status, created) = t.post("/api/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["sessionId"].as_str().unwrap().to_string();

    let (status, pushed) = t
        .post(&format!("/api/sessions/{id}/events"), Some(json!({"event": {"type": "X"}})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pushed["eventCount"], 1);

    let (status, events) = t.get(&format!("/api/sessions/{id}/events?limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    let events = events["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "X");
}

#[tokio::test]
async fn producer_event_reaches_every_connection() {
    let t = boot_server().await;
    let (mut sub1, ack) = join(&t, Some("sess_fanout"), "subscriber").await;
    assert_eq!(ack["sessionId"], "sess_fanout");
    let (mut sub2, _) = join(&t, Some("sess_fanout"), "subscriber").await;
    let (mut producer, _) = join(&t, Some("sess_fanout"), "producer").await;

    send_json(&mut producer, json!({"type": "EVENT", "event": {"type": "FOO", "n": 1}})).await;

    for ws in [&mut sub1, &mut sub2, &mut producer] {
        let msg = read_until_type(ws, "EVENT_BROADCAST").await;
        assert_eq!(msg["sourceRole"], "producer");
        assert_eq!(msg["event"]["type"], "FOO");
        assert_eq!(msg["event"]["n"], 1);
        assert_eq!(msg["event"]["sessionId"], "sess_fanout");
        assert!(msg["event"]["addedAt"].is_number());
    }
}

#[tokio::test]
async fn push_to_unknown_session_creates_nothing() {
    let t = boot_server().await;
    let (status, body) = t
        .post("/api/sessions/unknown-id/events", Some(json!({"event": {"type": "X"}})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SESSION_NOT_FOUND");

    let (_, list) = t.get("/api/sessions").await;
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn event_without_payload_errors_only_to_sender() {
    let t = boot_server().await;
    let (mut producer, ack) = join(&t, None, "producer").await;
    let id = ack["sessionId"].as_str().unwrap().to_string();
    let (mut sub, _) = join(&t, Some(&id), "subscriber").await;
    let _ = read_until_type(&mut producer, "CLIENT_CONNECTED").await;

    send_json(&mut producer, json!({"type": "EVENT"})).await;
    let reply = read_json(&mut producer).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "Event is required");
    assert_silent(&mut sub).await;

    let (_, detail) = t.get(&format!("/api/sessions/{id}")).await;
    assert_eq!(detail["session"]["eventCount"], 0);
}

#[tokio::test]
async fn api_push_is_broadcast_like_a_producer_event() {
    let t = boot_server().await;
    let (mut sub, ack) = join(&t, None, "subscriber").await;
    let id = ack["sessionId"].as_str().unwrap().to_string();

    let (status, _) = t
        .post(&format!("/api/sessions/{id}/events"), Some(json!({"event": {"type": "FROM_API"}})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let msg = read_until_type(&mut sub, "EVENT_BROADCAST").await;
    assert_eq!(msg["sourceRole"], "producer");
    assert_eq!(msg["event"]["type"], "FROM_API");
}

#[tokio::test]
async fn message_before_handshake_closes_4001() {
    let t = boot_server().await;
    let mut ws = connect(&t.ws_url()).await;
    send_json(&mut ws, json!({"type": "PING"})).await;
    assert_eq!(read_close_code(&mut ws).await, Some(4001));
}

#[tokio::test]
async fn invalid_json_closes_4002() {
    let t = boot_server().await;
    let mut ws = connect(&t.ws_url()).await;
    ws.send(Message::text("not json")).await.unwrap();
    assert_eq!(read_close_code(&mut ws).await, Some(4002));
}

#[tokio::test]
async fn invalid_role_closes_4003() {
    let t = boot_server().await;
    let mut ws = connect(&t.ws_url()).await;
    send_json(&mut ws, json!({"type": "HANDSHAKE", "role": "admin"})).await;
    assert_eq!(read_close_code(&mut ws).await, Some(4003));
}

#[tokio::test]
async fn ping_and_state_snapshot() {
    let t = boot_server().await;
    let (mut producer, ack) = join(&t, None, "producer").await;

    send_json(&mut producer, json!({"type": "PING"})).await;
    let pong = read_json(&mut producer).await;
    assert_eq!(pong["type"], "PONG");
    assert!(pong["timestamp"].is_number());

    send_json(&mut producer, json!({"type": "METRICS_UPDATE", "metrics": {"tokens": 42}})).await;
    let merged = read_until_type(&mut producer, "METRICS_UPDATE_BROADCAST").await;
    assert_eq!(merged["metrics"]["tokens"], 42);
    assert!(merged["metrics"]["updatedAt"].is_number());

    send_json(&mut producer, json!({"type": "GET_STATE"})).await;
    let snapshot = read_until_type(&mut producer, "STATE_SNAPSHOT").await;
    assert_eq!(snapshot["state"]["sessionId"], ack["sessionId"]);
    assert_eq!(snapshot["state"]["status"], "connected");
    assert_eq!(snapshot["state"]["metrics"]["tokens"], 42);

    let id = ack["sessionId"].as_str().unwrap();
    let (_, metrics) = t.get(&format!("/api/sessions/{id}/metrics")).await;
    assert_eq!(metrics["metrics"]["tokens"], 42);
}

#[tokio::test]
async fn last_disconnect_removes_session() {
    let t = boot_server().await;
    let (mut producer, ack) = join(&t, None, "producer").await;
    let (mut sub, _) = join(&t, ack["sessionId"].as_str(), "subscriber").await;
    let id = ack["sessionId"].as_str().unwrap().to_string();

    producer.close(None).await.unwrap();
    let notice = read_until_type(&mut sub, "CLIENT_DISCONNECTED").await;
    assert_eq!(notice["role"], "producer");

    let (status, detail) = t.get(&format!("/api/sessions/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["session"]["status"], "disconnected");

    sub.close(None).await.unwrap();
    let removed = timeout(TIMEOUT, async {
        loop {
            let (status, _) = t.get(&format!("/api/sessions/{id}")).await;
            if status == StatusCode::NOT_FOUND {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(removed.is_ok(), "session was not removed");
}

#[tokio::test]
async fn deleted_session_reports_not_found_to_attached_socket() {
    let t = boot_server().await;
    let (mut producer, ack) = join(&t, None, "producer").await;
    let id = ack["sessionId"].as_str().unwrap().to_string();

    let resp = t
        .http
        .delete(t.url(&format!("/api/sessions/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    send_json(&mut producer, json!({"type": "EVENT", "event": {"type": "LATE"}})).await;
    let reply = read_json(&mut producer).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], format!("Session not found: {id}"));

    send_json(&mut producer, json!({"type": "PING"})).await;
    assert_eq!(read_json(&mut producer).await["type"], "PONG");
}

#[tokio::test]
async fn idle_sessions_expire() {
    let config = ServerConfig {
        session_timeout_secs: 0,
        sweep_interval_secs: 1,
        ..ServerConfig::default()
    };
    let t = boot_with(config).await;
    let (_, created) = t.post("/api/sessions", None).await;
    let id = created["sessionId"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let (status, _) = t.get(&format!("/api/sessions/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shutdown_closes_sockets_with_1001() {
    let t = boot_server().await;
    let (mut sub, _) = join(&t, None, "subscriber").await;

    t.server
        .graceful_shutdown(Vec::new(), Some(Duration::from_secs(2)))
        .await;
    assert_eq!(read_close_code(&mut sub).await, Some(1001));
    assert_eq!(t.server.store().session_count(), 0);
}

#[tokio::test]
async fn health_counts_connections() {
    let t = boot_server().await;
    let (_producer, _) = join(&t, None, "producer").await;

    let (status, health) = t.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["sessions"], 1);
}
