//! In-process generation service used by the async tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{net::TcpListener, sync::Mutex};

use crate::{GenerationClient, SessionSnapshot};

#[derive(Debug, Clone)]
pub enum Reply {
    Event(Value),
    Raw(String),
    Pause(Duration),
    Close,
}

pub type Script = Arc<dyn Fn(&Value) -> Vec<Reply> + Send + Sync>;

#[derive(Clone)]
struct ServerState {
    script: Script,
    handshake_delay: Duration,
    connections: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Value>>>,
}

pub struct GenerationServer {
    pub base_url: String,
    connections: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Value>>>,
}

impl GenerationServer {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn commands(&self) -> Vec<Value> {
        self.commands.lock().await.clone()
    }
}

pub async fn spawn_generation_server(
    script: impl Fn(&Value) -> Vec<Reply> + Send + Sync + 'static,
) -> GenerationServer {
    spawn_slow_generation_server(Duration::ZERO, script).await
}

/// Like `spawn_generation_server`, but every upgrade waits `handshake_delay` first.
pub async fn spawn_slow_generation_server(
    handshake_delay: Duration,
    script: impl Fn(&Value) -> Vec<Reply> + Send + Sync + 'static,
) -> GenerationServer {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState {
        script: Arc::new(script),
        handshake_delay,
        connections: Arc::new(AtomicUsize::new(0)),
        commands: Arc::new(Mutex::new(Vec::new())),
    };
    let server = GenerationServer {
        base_url: format!("http://{addr}"),
        connections: Arc::clone(&state.connections),
        commands: Arc::clone(&state.commands),
    };
    let app = Router::new()
        .route("/api/ws/generation", get(ws_route))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    server
}

async fn ws_route(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    if !state.handshake_delay.is_zero() {
        tokio::time::sleep(state.handshake_delay).await;
    }
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: ServerState, socket: WebSocket) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sender, mut receiver) = socket.split();

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(command) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        state.commands.lock().await.push(command.clone());

        for reply in (state.script)(&command) {
            let outgoing = match reply {
                Reply::Event(value) => Message::Text(value.to_string()),
                Reply::Raw(text) => Message::Text(text),
                Reply::Pause(duration) => {
                    tokio::time::sleep(duration).await;
                    continue;
                }
                Reply::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    return;
                }
            };
            if sender.send(outgoing).await.is_err() {
                return;
            }
        }
    }
}

/// Base url that accepts TCP connections but never answers the handshake.
pub async fn stalled_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("http://{addr}")
}

/// Base url on which nothing is listening.
pub async fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

pub async fn wait_for_snapshot(
    client: &GenerationClient,
    mut accept: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = client.snapshot().await;
        if accept(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session did not reach the expected shape: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn case_json(name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "priority": "Normal",
        "case_type": "positive",
        "steps": [
            {"action": format!("{name}: open page"), "test_data": "-", "ui": "Page shown", "api": "-", "db": "-"}
        ],
    })
}

/// The three-layer run from the login requirement example.
pub fn smoke_run() -> Vec<Reply> {
    use serde_json::json;
    vec![
        Reply::Event(json!({"type": "layer_start", "layer": 1, "name": "QA documentation"})),
        Reply::Event(json!({"type": "layer_done", "layer": 1, "elapsed": 12, "data": {"qa_doc": "# QA Doc"}})),
        Reply::Event(json!({"type": "layer_start", "layer": 2})),
        Reply::Event(json!({"type": "layer_done", "layer": 2, "elapsed": 20, "data": {"count": 3}})),
        Reply::Event(json!({"type": "case_start", "i": 1, "total": 3, "name": "Valid login"})),
        Reply::Event(json!({"type": "case_done", "i": 1, "case": case_json("Valid login")})),
        Reply::Event(json!({"type": "case_done", "i": 2, "case": case_json("Remember me")})),
        Reply::Event(json!({"type": "case_done", "i": 3, "case": case_json("Logout")})),
        Reply::Event(json!({"type": "generation_done"})),
    ]
}

pub fn export_reply() -> Vec<Reply> {
    vec![Reply::Event(serde_json::json!({
        "type": "export_done",
        "xml": "<testCases/>",
        "csv": "name,priority",
        "md": "# Test cases",
    }))]
}

/// Plays `smoke_run` for `start` and `export_reply` for `export`.
pub fn standard_script(command: &Value) -> Vec<Reply> {
    match command["action"].as_str() {
        Some("start") => smoke_run(),
        Some("export") => export_reply(),
        _ => vec![Reply::Event(serde_json::json!({
            "type": "error",
            "message": format!("Unknown action: {}", command["action"]),
        }))],
    }
}
