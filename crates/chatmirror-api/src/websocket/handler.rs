//! WebSocket handler implementation.
//!
//! The connection registers with the hub and a writer task drains the
//! subscription. The hub closes the subscription when the viewer falls
//! behind, and a write that exceeds the send timeout ends the connection.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use chatmirror_sync::{Snapshot, Subscription};

use crate::error::ApiError;
use crate::http::handlers::PortQuery;
use crate::state::ApiState;

use super::message::WsMessage;

type WsSender = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler. `?port=` picks the initial port; a malformed
/// one is refused before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PortQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let port = state.resolve_port([query.port_arg().as_ref()])?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, port)))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, port: u16) {
    let Subscription { id, receiver } = state.service.subscribe(port);
    info!("WebSocket connected: {} on port {}", id, port);

    let (sender, mut incoming) = socket.split();
    let (reply_tx, reply_rx) = mpsc::channel::<WsMessage>(16);

    let connected = WsMessage::Connected {
        connection_id: id.clone(),
        port,
    };
    let mut writer = tokio::spawn(write_loop(
        sender,
        connected,
        receiver,
        reply_rx,
        state.send_timeout(),
    ));

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!("Writer for {} finished", id);
                break;
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    trace!("Received from {}: {}", id, text.as_str());
                    match serde_json::from_str::<WsMessage>(text.as_str()) {
                        Ok(msg) => handle_message(msg, &reply_tx, &id, &state).await,
                        Err(e) => {
                            warn!("Failed to parse WebSocket message from {}: {}", id, e);
                            let _ = reply_tx
                                .send(WsMessage::error("PARSE_ERROR", "Failed to parse message"))
                                .await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket closed: {}", id);
                    break;
                }
                Some(Err(e)) => {
                    error!("WebSocket error on {}: {}", id, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    state.service.unsubscribe(&id);
    writer.abort();
    info!("WebSocket disconnected: {}", id);
}

/// Send `greeting`, then forward snapshots and replies until either source
/// ends or a write fails.
async fn write_loop(
    mut sender: WsSender,
    greeting: WsMessage,
    mut snapshots: mpsc::Receiver<Arc<Snapshot>>,
    mut replies: mpsc::Receiver<WsMessage>,
    send_timeout: Duration,
) {
    match serde_json::to_string(&greeting) {
        Ok(text) => {
            if write(&mut sender, text, send_timeout).await.is_err() {
                return;
            }
        }
        Err(e) => error!("Failed to encode greeting: {}", e),
    }

    loop {
        let text = tokio::select! {
            snapshot = snapshots.recv() => match snapshot {
                Some(snapshot) => snapshot.to_update().to_string(),
                None => {
                    debug!("Subscription closed by the hub");
                    break;
                }
            },
            reply = replies.recv() => match reply {
                Some(reply) => match serde_json::to_string(&reply) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode reply: {}", e);
                        continue;
                    }
                },
                None => break,
            },
        };

        if write(&mut sender, text, send_timeout).await.is_err() {
            return;
        }
    }

    let _ = tokio::time::timeout(send_timeout, sender.send(Message::Close(None))).await;
}

/// One bounded write. A slow or broken viewer yields `Err`.
async fn write(sender: &mut WsSender, text: String, send_timeout: Duration) -> Result<(), ()> {
    match tokio::time::timeout(send_timeout, sender.send(Message::Text(text.into()))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!("Write failed: {}", e);
            Err(())
        }
        Err(_) => {
            warn!("Write exceeded {:?}, dropping viewer", send_timeout);
            Err(())
        }
    }
}

async fn handle_message(
    msg: WsMessage,
    tx: &mpsc::Sender<WsMessage>,
    connection_id: &str,
    state: &Arc<ApiState>,
) {
    match msg {
        WsMessage::Ping { timestamp } => {
            let _ = tx.send(WsMessage::Pong { timestamp }).await;
        }
        WsMessage::SwitchPort { port } => match port.port() {
            Some(port) => {
                if state.service.switch_port(connection_id, port) {
                    info!("{} switched to port {}", connection_id, port);
                } else {
                    warn!("{} is no longer subscribed", connection_id);
                }
            }
            None => {
                let _ = tx
                    .send(WsMessage::error("INVALID_PORT", format!("invalid port: {:?}", port)))
                    .await;
            }
        },
        WsMessage::ClientLog { level, data } => log_client(connection_id, level.as_deref(), &data),
        WsMessage::Pong { .. } => {
            debug!("Pong received from {}", connection_id);
        }
        _ => {
            warn!("Unhandled message type from {}", connection_id);
        }
    }
}

fn log_client(connection_id: &str, level: Option<&str>, data: &Value) {
    let text = match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match level {
        Some("error") => error!(client = connection_id, "{}", text),
        Some("warn") => warn!(client = connection_id, "{}", text),
        Some("debug") => debug!(client = connection_id, "{}", text),
        _ => info!(client = connection_id, "{}", text),
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
