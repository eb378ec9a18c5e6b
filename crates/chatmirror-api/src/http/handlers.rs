//! Relay HTTP handlers.
//!
//! Every IDE-facing endpoint takes an optional `port` query parameter and
//! falls back to the configured default port.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use chatmirror_sync::{Action, MODES, SubmitOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::{ApiState, PortArg};

/// Query parameters shared by the IDE-facing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PortQuery {
    pub port: Option<String>,
    pub force: Option<String>,
}

impl PortQuery {
    pub(crate) fn port_arg(&self) -> Option<PortArg> {
        self.port.clone().map(PortArg::Text)
    }

    fn force(&self) -> bool {
        matches!(self.force.as_deref(), Some("1" | "true" | "yes"))
    }
}

/// Body of `POST /send`.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "msgId")]
    pub msg_id: Option<String>,
    #[serde(default)]
    pub port: Option<PortArg>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct SetModelRequest {
    pub model: String,
}

/// `GET /app-state` response.
#[derive(Debug, Serialize)]
pub struct AppStateResponse {
    #[serde(rename = "activePort")]
    pub active_port: u16,
    pub mode: String,
    pub model: String,
}

/// Submit a chat message to the IDE.
pub async fn send_message(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PortQuery>,
    Json(body): Json<SendRequest>,
) -> Result<Json<Value>, ApiError> {
    state.increment_requests();
    let query_port = query.port_arg();
    let port = state.resolve_port([body.port.as_ref(), query_port.as_ref()])?;
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }

    let mut action = Action::new(body.message);
    action.msg_id = body.msg_id;
    action.force = body.force || query.force();
    info!(port, msg_id = ?action.msg_id, "Sending message");

    let reply = match state.service.send_action(port, action).await? {
        SubmitOutcome::Ignored => json!({"ok": true, "ignored": true}),
        SubmitOutcome::Forwarded(outcome) if outcome.ok => {
            json!({"ok": true, "method": outcome.method, "port": port})
        }
        SubmitOutcome::Forwarded(outcome) => {
            let reason = outcome
                .reason
                .or(outcome.error)
                .unwrap_or_else(|| "not_sent".to_string());
            warn!(port, %reason, "Message not sent");
            json!({"ok": false, "reason": reason})
        }
    };
    Ok(Json(reply))
}

/// Capture the chat view once.
pub async fn snapshot(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PortQuery>,
) -> Result<Json<Value>, ApiError> {
    state.increment_requests();
    let port = state.resolve_port([query.port_arg().as_ref()])?;
    match state.service.capture_once(port).await? {
        Some(snapshot) => Ok(Json(snapshot.to_update())),
        None => Err(ApiError::NotFound(format!("no chat view on port {}", port))),
    }
}

/// Current mode and model. An unreachable IDE reports `Unknown` for both.
pub async fn app_state(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PortQuery>,
) -> Result<Json<AppStateResponse>, ApiError> {
    state.increment_requests();
    let port = state.resolve_port([query.port_arg().as_ref()])?;
    let current = match state.service.app_state(port).await {
        Ok(current) => current,
        Err(e) => {
            warn!(port, error = %e, "Cannot read app state");
            Default::default()
        }
    };
    Ok(Json(AppStateResponse {
        active_port: port,
        mode: current.mode,
        model: current.model,
    }))
}

pub async fn set_mode(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PortQuery>,
    Json(body): Json<SetModeRequest>,
) -> Result<Json<Value>, ApiError> {
    state.increment_requests();
    let port = state.resolve_port([query.port_arg().as_ref()])?;
    if !MODES.contains(&body.mode.as_str()) {
        return Err(ApiError::bad_request(format!(
            "unknown mode {:?}, expected one of {:?}",
            body.mode, MODES
        )));
    }
    info!(port, mode = %body.mode, "Setting mode");
    Ok(Json(state.service.set_mode(port, &body.mode).await?))
}

pub async fn set_model(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PortQuery>,
    Json(body): Json<SetModelRequest>,
) -> Result<Json<Value>, ApiError> {
    state.increment_requests();
    let port = state.resolve_port([query.port_arg().as_ref()])?;
    if body.model.trim().is_empty() {
        return Err(ApiError::bad_request("model is required"));
    }
    info!(port, model = %body.model, "Setting model");
    Ok(Json(state.service.set_model(port, &body.model).await?))
}

/// Running state of every configured debug port.
pub async fn slots(State(state): State<Arc<ApiState>>) -> Json<Value> {
    state.increment_requests();
    Json(json!({"slots": state.service.slots().await}))
}

pub async fn health(State(state): State<Arc<ApiState>>) -> Json<Value> {
    let service = &state.service;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime().as_secs(),
        "requests": state.request_count(),
        "subscribers": service.hub().total_subscribers(),
        "polling": service.poller().active_ports(),
        "sessions": service.pool().ports(),
    }))
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
