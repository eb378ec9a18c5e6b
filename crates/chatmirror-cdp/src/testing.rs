//! Scripted DevTools endpoint for tests.
//!
//! Serves `/json/list` and a WebSocket per target on a loopback port. Every
//! command is recorded and answered by a replaceable responder;
//! `Runtime.enable` also announces the configured execution contexts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::protocol::{Target, events};

/// How the fake answers one command.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// `{id, result}` immediately.
    Result(Value),
    /// `{id, error: {code, message}}` immediately.
    Error { code: i64, message: String },
    /// `{id, result}` after a delay, letting later commands overtake it.
    Delayed(Duration, Value),
    /// Never answer.
    Silent,
}

impl FakeReply {
    /// Successful `Runtime.evaluate` result carrying `value`.
    pub fn evaluated(value: Value) -> Self {
        FakeReply::Result(json!({"result": {"type": "object", "value": value}}))
    }

    /// Stale-context failure as reported by Chrome.
    pub fn stale_context() -> Self {
        FakeReply::Error {
            code: -32000,
            message: "Cannot find context with specified id".to_string(),
        }
    }
}

type Responder = Arc<dyn Fn(&str, &Value) -> FakeReply + Send + Sync>;

#[derive(Clone)]
enum Control {
    Push(Value),
    Drop,
}

struct FakeState {
    addr: SocketAddr,
    targets: Mutex<Vec<Value>>,
    contexts: Mutex<Vec<Value>>,
    responder: Mutex<Responder>,
    requests: Mutex<Vec<(String, Value)>>,
    connections: AtomicUsize,
    control: broadcast::Sender<Control>,
}

/// A fake browser exposing one debug port.
pub struct FakeDevtools {
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

impl FakeDevtools {
    /// Start with one IDE page target and one default-world context (id 1).
    /// Every command is answered with `{}`.
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake devtools");
        let addr = listener.local_addr().expect("fake devtools address");
        let (control, _) = broadcast::channel(64);
        let responder: Responder = Arc::new(|_, _| FakeReply::Result(json!({})));

        let state = Arc::new(FakeState {
            addr,
            targets: Mutex::new(vec![Self::page(
                "page-1",
                "project - IDE",
                "vscode-file://vscode-app/workbench.html",
            )]),
            contexts: Mutex::new(vec![Self::context(1, true)]),
            responder: Mutex::new(responder),
            requests: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            control,
        });

        let app = Router::new()
            .route("/json/list", get(list_targets))
            .route("/devtools/page/{id}", get(upgrade))
            .with_state(state.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { state, server }
    }

    pub fn port(&self) -> u16 {
        self.state.addr.port()
    }

    /// List entry for a page; the debugger URL is filled in when served.
    pub fn page(id: &str, title: &str, url: &str) -> Value {
        json!({"id": id, "type": "page", "title": title, "url": url})
    }

    /// Context description as carried by `executionContextCreated`.
    pub fn context(id: i64, is_default: bool) -> Value {
        json!({
            "id": id,
            "origin": "vscode-file://vscode-app",
            "name": if is_default { "" } else { "isolated" },
            "auxData": {
                "isDefault": is_default,
                "type": if is_default { "default" } else { "isolated" },
                "frameId": "frame-1"
            }
        })
    }

    /// The first listed target, ready for `Session::open`.
    pub fn target(&self) -> Target {
        let entry = self.state.targets.lock().first().cloned().unwrap_or(Value::Null);
        let id = entry["id"].as_str().unwrap_or("page-1").to_string();
        Target {
            port: self.port(),
            ws_url: ws_url(self.state.addr, &id),
            title: entry["title"].as_str().unwrap_or_default().to_string(),
            url: entry["url"].as_str().unwrap_or_default().to_string(),
            target_type: "page".to_string(),
            id,
        }
    }

    pub fn set_targets(&self, targets: Vec<Value>) {
        *self.state.targets.lock() = targets;
    }

    /// Contexts announced on the next `Runtime.enable`.
    pub fn set_contexts(&self, contexts: Vec<Value>) {
        *self.state.contexts.lock() = contexts;
    }

    pub fn respond_with(&self, responder: impl Fn(&str, &Value) -> FakeReply + Send + Sync + 'static) {
        *self.state.responder.lock() = Arc::new(responder);
    }

    /// Push an event to every open connection.
    pub fn emit(&self, method: &str, params: Value) {
        let _ = self
            .state
            .control
            .send(Control::Push(json!({"method": method, "params": params})));
    }

    /// Drop every open connection without a close frame.
    pub fn drop_connections(&self) {
        let _ = self.state.control.send(Control::Drop);
    }

    /// WebSocket connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Params of every recorded command named `method`.
    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

impl Drop for FakeDevtools {
    fn drop(&mut self) {
        self.drop_connections();
        self.server.abort();
    }
}

fn ws_url(addr: SocketAddr, id: &str) -> String {
    format!("ws://{}/devtools/page/{}", addr, id)
}

async fn list_targets(State(state): State<Arc<FakeState>>) -> Json<Value> {
    let targets: Vec<Value> = state
        .targets
        .lock()
        .iter()
        .map(|entry| {
            let mut entry = entry.clone();
            if entry.get("webSocketDebuggerUrl").is_none() {
                let id = entry["id"].as_str().unwrap_or_default().to_string();
                entry["webSocketDebuggerUrl"] = json!(ws_url(state.addr, &id));
            }
            entry
        })
        .collect();
    Json(Value::Array(targets))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<FakeState>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
        .into_response()
}

async fn serve_socket(socket: WebSocket, state: Arc<FakeState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut control = state.control.subscribe();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => state.handle_command(&text, &out_tx),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            ctrl = control.recv() => match ctrl {
                Ok(Control::Push(frame)) => {
                    let _ = out_tx.send(frame.to_string());
                }
                Ok(Control::Drop) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => {}
            },
        }
    }

    writer.abort();
}

impl FakeState {
    fn handle_command(&self, text: &str, out: &mpsc::UnboundedSender<String>) {
        let Ok(request) = serde_json::from_str::<Value>(text) else {
            return;
        };
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let params = request.get("params").cloned().unwrap_or(Value::Null);
        self.requests.lock().push((method.clone(), params.clone()));

        if method == "Runtime.enable" {
            for context in self.contexts.lock().iter() {
                let event = json!({
                    "method": events::CONTEXT_CREATED,
                    "params": {"context": context}
                });
                let _ = out.send(event.to_string());
            }
        }

        let responder = self.responder.lock().clone();
        match responder(&method, &params) {
            FakeReply::Result(result) => {
                let _ = out.send(json!({"id": id, "result": result}).to_string());
            }
            FakeReply::Error { code, message } => {
                let frame = json!({"id": id, "error": {"code": code, "message": message}});
                let _ = out.send(frame.to_string());
            }
            FakeReply::Delayed(delay, result) => {
                let out = out.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = out.send(json!({"id": id, "result": result}).to_string());
                });
            }
            FakeReply::Silent => {}
        }
    }
}
