//! Core session struct and CDP command dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::CdpError;
use crate::protocol::{CdpEvent, CdpRequest, Inbound, Target, events};

use super::SessionOptions;
use super::contexts::ContextRegistry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const EVENT_BUFFER: usize = 64;

/// Pending request waiting for response.
struct PendingRequest {
    tx: oneshot::Sender<Result<Value, CdpError>>,
}

/// State shared between the session handle and its reader task.
pub(super) struct SessionShared {
    pending: Mutex<HashMap<u64, PendingRequest>>,
    closed: AtomicBool,
    pub(super) contexts: ContextRegistry,
    events: broadcast::Sender<CdpEvent>,
}

impl SessionShared {
    fn dispatch(&self, text: &str) {
        match Inbound::decode(text) {
            Ok(Inbound::Response { id, outcome }) => {
                let pending = self.pending.lock().remove(&id);
                match pending {
                    Some(req) => {
                        let _ = req.tx.send(outcome);
                    }
                    None => trace!("Dropping orphaned response {}", id),
                }
            }
            Ok(Inbound::Event(event)) => {
                match event.method.as_str() {
                    events::TARGET_CRASHED | events::DETACHED => {
                        warn!("Target reported {}, closing session", event.method);
                        self.teardown();
                    }
                    _ => self.contexts.apply(&event),
                }
                let _ = self.events.send(event);
            }
            Err(e) => warn!("Failed to parse CDP message: {}", e),
        }
    }

    /// Mark the session closed and fail every pending call. Taking the
    /// pending lock first means no call can register after the drain.
    fn teardown(&self) {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock();
            self.closed.store(true, Ordering::SeqCst);
            pending.drain().map(|(_, req)| req).collect()
        };
        if !drained.is_empty() {
            debug!("Failing {} pending calls on teardown", drained.len());
        }
        for req in drained {
            let _ = req.tx.send(Err(CdpError::SessionClosed));
        }
    }
}

/// A WebSocket session attached to one page target.
pub struct Session {
    target: Target,
    options: SessionOptions,
    ws_tx: tokio::sync::Mutex<WsSink>,
    request_id: AtomicU64,
    pub(super) shared: Arc<SessionShared>,
    recv_task: JoinHandle<()>,
}

impl Session {
    /// Connect to `target`, enable `Runtime` and wait for the initial
    /// contexts to be announced.
    pub async fn open(target: Target, options: SessionOptions) -> Result<Self, CdpError> {
        let handshake = tokio::time::timeout(
            options.handshake_timeout,
            tokio_tungstenite::connect_async(target.ws_url.as_str()),
        )
        .await;

        let (ws_stream, _) = match handshake {
            Err(_) => {
                return Err(CdpError::HandshakeTimeout {
                    url: target.ws_url.clone(),
                    timeout_ms: options.handshake_timeout.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                return Err(CdpError::ConnectFailed(format!("{}: {}", target.ws_url, e)));
            }
            Ok(Ok(connected)) => connected,
        };

        let (ws_sink, ws_source) = ws_stream.split();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let shared = Arc::new(SessionShared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            contexts: ContextRegistry::default(),
            events,
        });

        let recv_task = {
            let shared = shared.clone();
            tokio::spawn(async move {
                receive_loop(ws_source, shared).await;
            })
        };

        let session = Self {
            target,
            options,
            ws_tx: tokio::sync::Mutex::new(ws_sink),
            request_id: AtomicU64::new(1),
            shared,
            recv_task,
        };

        session.call("Runtime.enable", None, None).await?;
        tokio::time::sleep(session.options.context_settle).await;

        info!(
            "Session opened on port {} (target {}, {} contexts)",
            session.target.port,
            session.target.id,
            session.shared.contexts.newest_first().len()
        );
        Ok(session)
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn port(&self) -> u16 {
        self.target.port
    }

    pub fn is_healthy(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Stream of every event the target pushes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CdpEvent> {
        self.shared.events.subscribe()
    }

    /// Send a command with the default call timeout.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        context_id: Option<i64>,
    ) -> Result<Value, CdpError> {
        self.call_with_timeout(method, params, context_id, self.options.call_timeout)
            .await
    }

    /// Send a command and wait for its response.
    ///
    /// On timeout the pending entry is removed, so a late response is
    /// discarded and the session stays usable.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        context_id: Option<i64>,
        timeout: Duration,
    ) -> Result<Value, CdpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method,
            params: with_context(params, context_id),
        };
        let json = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock();
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(CdpError::SessionClosed);
            }
            pending.insert(id, PendingRequest { tx });
        }

        trace!("CDP send: {}", json);
        let sent = {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(json.into())).await
        };
        if let Err(e) = sent {
            warn!("CDP send failed on port {}: {}", self.target.port, e);
            self.shared.pending.lock().remove(&id);
            self.shared.teardown();
            return Err(CdpError::SessionClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::SessionClosed),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                debug!("Call {} ({}) timed out", id, method);
                Err(CdpError::CallTimeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Close the connection. Pending calls fail with `SessionClosed`.
    pub async fn close(&self) {
        self.shared.teardown();
        let mut ws = self.ws_tx.lock().await;
        if let Err(e) = ws.close().await {
            trace!("Error closing session socket: {}", e);
        }
        debug!("Session on port {} closed", self.target.port);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

/// Merge `contextId` into the params object.
fn with_context(params: Option<Value>, context_id: Option<i64>) -> Option<Value> {
    let Some(context_id) = context_id else {
        return params;
    };
    let mut map = match params {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.insert("contextId".to_string(), json!(context_id));
    Some(Value::Object(map))
}

/// WebSocket receive loop.
async fn receive_loop(mut ws_source: WsSource, shared: Arc<SessionShared>) {
    while let Some(msg) = ws_source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                trace!("CDP recv: {}", text);
                shared.dispatch(&text);
            }
            Ok(Message::Close(_)) => {
                debug!("WebSocket closed by target");
                break;
            }
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }
    shared.teardown();
}
