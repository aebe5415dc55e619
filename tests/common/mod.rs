#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use fluxbot::commands::CommandRegistry;
use fluxbot::config::Config;
use fluxbot::error::ClientError;
use fluxbot::gateway::reconnect::ReconnectPolicy;
use fluxbot::gateway::Client;
use fluxbot::interpreter::FunctionRegistry;

pub const TOKEN: &str = "t0k3n";

pub type ServerWs = WebSocketStream<TcpStream>;

/// Bind a loopback listener for a mock gateway; returns it plus its ws URL.
pub async fn bind_gateway() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://127.0.0.1:{}", listener.local_addr().unwrap().port());
    (listener, url)
}

/// Accept one websocket connection on the mock gateway.
pub async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("timed out waiting for a connection")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

pub async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame from the client, parsed. Panics on close or timeout.
pub async fn recv_json(ws: &mut ServerWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended unexpectedly")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => {}
        }
    }
}

/// Next frame with the given opcode, skipping others (e.g. heartbeats).
pub async fn recv_op(ws: &mut ServerWs, op: u64) -> Value {
    loop {
        let frame = recv_json(ws).await;
        if frame["op"] == op {
            return frame;
        }
    }
}

/// Wait for the client to close the connection; returns the close code.
pub async fn recv_close(ws: &mut ServerWs) -> Option<u16> {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return None,
        }
    }
}

/// Close the connection from the gateway side with a specific code.
pub async fn close_with(ws: &mut ServerWs, code: u16) {
    let _ = ws
        .close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        }))
        .await;
}

// Frame builders.

pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}})
}

pub fn ready(session_id: &str, seq: u64) -> Value {
    json!({"op": 0, "s": seq, "t": "READY", "d": {"session_id": session_id}})
}

pub fn resumed(seq: u64) -> Value {
    json!({"op": 0, "s": seq, "t": "RESUMED", "d": {}})
}

pub fn heartbeat_ack() -> Value {
    json!({"op": 11})
}

pub fn invalid_session(resumable: bool) -> Value {
    json!({"op": 9, "d": resumable})
}

pub fn reconnect_request() -> Value {
    json!({"op": 7})
}

pub fn message_create(seq: u64, channel_id: &str, content: &str, bot: bool) -> Value {
    json!({
        "op": 0,
        "s": seq,
        "t": "MESSAGE_CREATE",
        "d": {
            "id": "m1",
            "channel_id": channel_id,
            "content": content,
            "author": {"id": "u1", "username": "someone", "bot": bot}
        }
    })
}

// Client construction.

pub fn test_config(gateway_url: &str, api_url: &str) -> Config {
    Config {
        token: TOKEN.to_string(),
        prefix: "!".to_string(),
        commands_path: PathBuf::from("./commands"),
        gateway_url: gateway_url.to_string(),
        api_url: api_url.to_string(),
        debug: false,
    }
}

pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::new().with_base_delay(Duration::from_millis(20))
}

pub fn test_client(gateway_url: &str) -> Client {
    test_client_with(
        gateway_url,
        "http://127.0.0.1:1",
        Arc::new(CommandRegistry::empty("./commands")),
    )
}

pub fn test_client_with(
    gateway_url: &str,
    api_url: &str,
    commands: Arc<CommandRegistry>,
) -> Client {
    Client::new(
        test_config(gateway_url, api_url),
        commands,
        FunctionRegistry::with_builtins(),
    )
    .with_reconnect_policy(fast_policy())
}

/// Spawn the client; the returned sender triggers shutdown.
pub fn spawn_client(
    client: Client,
) -> (
    tokio::task::JoinHandle<Result<(), ClientError>>,
    oneshot::Sender<()>,
) {
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(client.run(async move {
        let _ = rx.await;
    }));
    (handle, tx)
}

/// Fresh temp directory for filesystem tests.
pub fn temp_dir(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&path).unwrap();
    path
}

// Minimal HTTP sink standing in for the REST API: accepts POSTs, hands the
// raw request (headers + body) to the test, always answers 200.

pub async fn spawn_rest_sink() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(request) = read_http_request(stream).await {
                    let _ = tx.send(request);
                }
            });
        }
    });

    (url, rx)
}

async fn read_http_request(mut stream: TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(headers_end) = find_headers_end(&buf) else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..headers_end]).to_string();
        let content_length = content_length(&headers);
        if buf.len() < headers_end + 4 + content_length {
            continue;
        }

        let body =
            String::from_utf8_lossy(&buf[headers_end + 4..headers_end + 4 + content_length])
                .to_string();
        let _ = stream
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
            )
            .await;
        let _ = stream.shutdown().await;
        return Some(format!("{headers}\r\n\r\n{body}"));
    }
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}
