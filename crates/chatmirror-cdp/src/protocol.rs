//! CDP protocol types and message definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CdpError;

/// Event method names the session reacts to.
pub mod events {
    pub const CONTEXT_CREATED: &str = "Runtime.executionContextCreated";
    pub const CONTEXT_DESTROYED: &str = "Runtime.executionContextDestroyed";
    pub const CONTEXTS_CLEARED: &str = "Runtime.executionContextsCleared";
    pub const TARGET_CRASHED: &str = "Inspector.targetCrashed";
    pub const DETACHED: &str = "Inspector.detached";
}

/// CDP request message.
#[derive(Debug, Serialize)]
pub struct CdpRequest<'a> {
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Raw inbound frame before classification.
#[derive(Debug, Deserialize)]
struct RawInbound {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpErrorResponse>,
    method: Option<String>,
    params: Option<Value>,
}

/// CDP error in response.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorResponse {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

/// An event pushed by the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}

/// A decoded inbound frame: a response correlated by id, or an event.
#[derive(Debug)]
pub enum Inbound {
    Response {
        id: u64,
        outcome: Result<Value, CdpError>,
    },
    Event(CdpEvent),
}

impl Inbound {
    /// Classify a text frame. Frames carrying `id` are responses; frames
    /// carrying only `method` are events.
    pub fn decode(text: &str) -> Result<Self, CdpError> {
        let raw: RawInbound = serde_json::from_str(text)?;

        if let Some(id) = raw.id {
            let outcome = match raw.error {
                Some(err) => {
                    let message = match err.data {
                        Some(data) if !data.is_empty() => format!("{} ({})", err.message, data),
                        _ => err.message,
                    };
                    Err(CdpError::Protocol {
                        code: err.code,
                        message,
                    })
                }
                None => Ok(raw.result.unwrap_or(Value::Null)),
            };
            return Ok(Inbound::Response { id, outcome });
        }

        match raw.method {
            Some(method) => Ok(Inbound::Event(CdpEvent {
                method,
                params: raw.params.unwrap_or(Value::Null),
            })),
            None => Err(CdpError::InvalidResponse(
                "frame has neither id nor method".to_string(),
            )),
        }
    }
}

/// Entry of the `/json/list` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
}

/// A debuggable page target reachable through a logical port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub port: u16,
    pub id: String,
    pub title: String,
    pub url: String,
    pub ws_url: String,
    pub target_type: String,
}

impl Target {
    /// Build a target from a list entry. Entries without a debugger URL
    /// cannot be attached to and yield `None`.
    pub fn from_descriptor(port: u16, desc: TargetDescriptor) -> Option<Self> {
        let ws_url = desc.web_socket_debugger_url?;
        Some(Self {
            port,
            id: desc.id,
            title: desc.title,
            url: desc.url,
            ws_url,
            target_type: desc.target_type,
        })
    }

    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// `context` payload of `Runtime.executionContextCreated`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDescription {
    pub id: i64,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub aux_data: Option<Value>,
}

impl ExecutionContextDescription {
    /// Whether the context is the frame's default (page) world.
    pub fn is_default(&self) -> bool {
        self.aux_data
            .as_ref()
            .and_then(|aux| aux.get("isDefault"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn frame_id(&self) -> Option<String> {
        self.aux_data
            .as_ref()
            .and_then(|aux| aux.get("frameId"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Remote object from Runtime domain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub object_type: String,
    pub subtype: Option<String>,
    pub value: Option<Value>,
    pub description: Option<String>,
}

/// Exception details from Runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub text: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Human-readable message, preferring the thrown value's description.
    pub fn message(&self) -> String {
        match self.exception.as_ref().and_then(|e| e.description.as_deref()) {
            Some(description) => format!("{}: {}", self.text, description),
            None => self.text.clone(),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
