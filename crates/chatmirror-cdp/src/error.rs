//! CDP error types.

use thiserror::Error;

/// Errors raised by discovery, sessions and the pool.
///
/// `Clone` so a single shared open attempt can report the same failure to
/// every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum CdpError {
    /// Nothing answered on the debug port, or the target list was unusable.
    #[error("DevTools endpoint on port {port} unreachable: {reason}")]
    Unreachable { port: u16, reason: String },

    /// The port answered but no target matched the IDE signature.
    #[error("No eligible page target on port {port}")]
    NotFound { port: u16 },

    /// WebSocket transport error while connecting.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// The WebSocket handshake did not complete in time.
    #[error("Handshake with {url} timed out after {timeout_ms}ms")]
    HandshakeTimeout { url: String, timeout_ms: u64 },

    /// The session's connection is gone.
    #[error("Session closed")]
    SessionClosed,

    /// No response arrived for a call in time. The session stays usable.
    #[error("Call {method} timed out after {timeout_ms}ms")]
    CallTimeout { method: String, timeout_ms: u64 },

    /// The browser answered with an error object.
    #[error("CDP error: {message} (code: {code})")]
    Protocol { code: i64, message: String },

    /// The evaluated expression threw.
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// A response that does not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

const STALE_CONTEXT_MARKERS: &[&str] = &[
    "Cannot find context with specified id",
    "Execution context was destroyed",
    "Cannot find default execution context",
];

impl CdpError {
    /// Whether the error means the execution context used for a call no
    /// longer exists. Such failures are recovered by refreshing contexts.
    pub fn is_stale_context(&self) -> bool {
        match self {
            CdpError::Protocol { message, .. } | CdpError::Evaluation(message) => {
                STALE_CONTEXT_MARKERS.iter().any(|m| message.contains(m))
            }
            _ => false,
        }
    }

    /// Whether the error is a transport or target failure the pool should
    /// drop the session for.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            CdpError::Unreachable { .. }
                | CdpError::NotFound { .. }
                | CdpError::ConnectFailed(_)
                | CdpError::HandshakeTimeout { .. }
                | CdpError::SessionClosed
        )
    }

    /// Whether the failure happened before any call reached a page, so
    /// nothing could have been delivered.
    pub fn is_undelivered(&self) -> bool {
        matches!(
            self,
            CdpError::Unreachable { .. }
                | CdpError::NotFound { .. }
                | CdpError::ConnectFailed(_)
                | CdpError::HandshakeTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for CdpError {
    fn from(e: serde_json::Error) -> Self {
        CdpError::Serialization(e.to_string())
    }
}
