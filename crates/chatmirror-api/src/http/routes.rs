//! HTTP route definitions.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::http::handlers;
use crate::state::ApiState;
use crate::websocket::ws_handler;

/// Build the relay router.
///
/// ```text
/// POST /send        - Submit a chat message (deduplicated by msgId)
/// GET  /snapshot    - Capture the chat view once
/// GET  /app-state   - Current mode and model
/// POST /set-mode    - Switch the IDE's mode
/// POST /set-model   - Switch the IDE's model
/// GET  /slots       - Running state of every configured port
/// GET  /health      - Status and counters
/// GET  /ws          - Live snapshot stream
/// ```
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/send", post(handlers::send_message))
        .route("/snapshot", get(handlers::snapshot))
        .route("/app-state", get(handlers::app_state))
        .route("/set-mode", post(handlers::set_mode))
        .route("/set-model", post(handlers::set_model))
        .route("/slots", get(handlers::slots))
        .route("/health", get(handlers::health))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
