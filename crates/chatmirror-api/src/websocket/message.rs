//! WebSocket control messages.
//!
//! Snapshot updates are serialized by the snapshot itself; this covers
//! everything else exchanged on the socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::PortArg;

/// WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Ping/heartbeat.
    Ping {
        #[serde(default)]
        timestamp: i64,
    },

    /// Pong response.
    Pong { timestamp: i64 },

    /// Viewer wants another port's chat.
    SwitchPort { port: PortArg },

    /// Log line forwarded from a viewer.
    ClientLog {
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        data: Value,
    },

    /// Connection established.
    Connected { connection_id: String, port: u16 },

    /// Error message.
    Error { code: String, message: String },
}

impl WsMessage {
    /// Create a new error message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
