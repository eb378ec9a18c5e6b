//! In-page scripts: capture, message injection and selector control.
//!
//! Every script is evaluated against the session's contexts in preference
//! order; the first context whose result is accepted wins. A failure caused
//! by a stale context refreshes the context set and retries once.

use chatmirror_cdp::{CdpError, Session};
use chatmirror_config::SyncConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::error::SyncError;
use crate::snapshot::Capture;

const CAPTURE_SCRIPT: &str = include_str!("scripts/capture.js");
const INJECT_SCRIPT: &str = include_str!("scripts/inject.js");
const APP_STATE_SCRIPT: &str = include_str!("scripts/app_state.js");
const SELECT_OPTION_SCRIPT: &str = include_str!("scripts/select_option.js");

/// Agent modes the IDE offers.
pub const MODES: &[&str] = &["Fast", "Planning"];

const UNKNOWN: &str = "Unknown";

/// Result of injecting a message into the chat editor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InjectOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InjectOutcome {
    fn editor_not_found() -> Self {
        Self {
            ok: false,
            error: Some("editor_not_found".to_string()),
            ..Default::default()
        }
    }

    /// The page refused because a response is still streaming.
    pub fn is_busy(&self) -> bool {
        self.reason.as_deref() == Some("busy")
    }
}

/// Mode and model shown by the IDE's selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default = "unknown")]
    pub mode: String,
    #[serde(default = "unknown")]
    pub model: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: unknown(),
            model: unknown(),
        }
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

enum Probe {
    Found {
        value: Value,
        context_id: Option<i64>,
    },
    /// No context produced an accepted value; carries the last value seen.
    Rejected(Option<Value>),
}

/// Builds and runs the page scripts.
#[derive(Debug, Clone)]
pub struct Automation {
    capture_expression: String,
}

impl Default for Automation {
    fn default() -> Self {
        Self {
            capture_expression: invoke(CAPTURE_SCRIPT, &[]),
        }
    }
}

impl Automation {
    /// Use `expression` verbatim as the capture expression.
    pub fn with_capture_expression(expression: impl Into<String>) -> Self {
        Self {
            capture_expression: expression.into(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        match &config.capture_script {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|source| {
                    SyncError::CaptureScript {
                        path: path.clone(),
                        source,
                    }
                })?;
                debug!("Using capture script from {}", path.display());
                Ok(Self::with_capture_expression(source))
            }
            None => Ok(Self::default()),
        }
    }

    /// Run the capture expression. `hint` is the context that last
    /// succeeded and is tried first while it is alive.
    ///
    /// Returns the capture and the context that produced it, or `None` when
    /// every context reported an error value.
    pub async fn capture(
        &self,
        session: &Session,
        hint: Option<i64>,
    ) -> Result<Option<(Capture, Option<i64>)>, CdpError> {
        let accept = |v: &Value| v.get("html").is_some_and(Value::is_string) && v.get("error").is_none();
        match probe_with_refresh(session, &self.capture_expression, false, hint, &accept).await? {
            Probe::Found { value, context_id } => {
                let capture: Capture = serde_json::from_value(value)?;
                Ok(Some((capture, context_id)))
            }
            Probe::Rejected(last) => {
                if let Some(reason) = last.as_ref().and_then(|v| v.get("error")) {
                    debug!("Capture on port {} rejected: {}", session.port(), reason);
                }
                Ok(None)
            }
        }
    }

    /// Type `text` into the chat editor and submit it. Stops at the first
    /// context that either sent the message or reported the page busy.
    pub async fn inject(
        &self,
        session: &Session,
        text: &str,
        force: bool,
    ) -> Result<InjectOutcome, CdpError> {
        let expression = invoke(INJECT_SCRIPT, &[json!(text), json!(force)]);
        let accept = |v: &Value| {
            v.get("ok").and_then(Value::as_bool) == Some(true)
                || v.get("reason").and_then(Value::as_str) == Some("busy")
        };
        let outcome = match probe_with_refresh(session, &expression, true, None, &accept).await? {
            Probe::Found { value, .. } => serde_json::from_value(value)?,
            Probe::Rejected(Some(value)) => {
                serde_json::from_value(value).unwrap_or_else(|_| InjectOutcome::editor_not_found())
            }
            Probe::Rejected(None) => InjectOutcome::editor_not_found(),
        };
        debug!(
            "Inject on port {}: ok={} method={:?} reason={:?}",
            session.port(),
            outcome.ok,
            outcome.method,
            outcome.reason.as_ref().or(outcome.error.as_ref())
        );
        Ok(outcome)
    }

    /// Read the current mode and model. Unknown when no context can tell.
    pub async fn app_state(&self, session: &Session) -> Result<AppState, CdpError> {
        let expression = invoke(APP_STATE_SCRIPT, &[]);
        let accept = |v: &Value| {
            v.get("error").is_none() && v.get("mode").and_then(Value::as_str).is_some_and(|m| m != UNKNOWN)
        };
        match probe_with_refresh(session, &expression, true, None, &accept).await? {
            Probe::Found { value, .. } => Ok(serde_json::from_value(value).unwrap_or_default()),
            Probe::Rejected(_) => Ok(AppState::default()),
        }
    }

    pub async fn set_mode(&self, session: &Session, mode: &str) -> Result<Value, CdpError> {
        self.select_option(session, "mode", mode).await
    }

    pub async fn set_model(&self, session: &Session, model: &str) -> Result<Value, CdpError> {
        self.select_option(session, "model", model).await
    }

    async fn select_option(
        &self,
        session: &Session,
        kind: &str,
        option: &str,
    ) -> Result<Value, CdpError> {
        let expression = invoke(SELECT_OPTION_SCRIPT, &[json!(kind), json!(option)]);
        let accept = |v: &Value| v.get("success").and_then(Value::as_bool) == Some(true);
        match probe_with_refresh(session, &expression, true, None, &accept).await? {
            Probe::Found { value, .. } => Ok(value),
            Probe::Rejected(Some(value)) => Ok(value),
            Probe::Rejected(None) => Ok(json!({"error": "Failed"})),
        }
    }
}

/// Call expression applying a function source to JSON-encoded arguments.
fn invoke(function: &str, args: &[Value]) -> String {
    let args: Vec<String> = args.iter().map(Value::to_string).collect();
    format!("({})({})", function.trim(), args.join(", "))
}

/// Contexts to try: the hint if still alive, then the preferred order. An
/// empty set falls back to the target's default context.
fn candidate_contexts(session: &Session, hint: Option<i64>) -> Vec<Option<i64>> {
    let hint = hint.filter(|id| session.has_context(*id));
    let mut ids: Vec<Option<i64>> = hint.into_iter().map(Some).collect();
    ids.extend(
        session
            .preferred_contexts()
            .into_iter()
            .filter(|ctx| Some(ctx.id) != hint)
            .map(|ctx| Some(ctx.id)),
    );
    if ids.is_empty() {
        ids.push(None);
    }
    ids
}

async fn probe<F>(
    session: &Session,
    expression: &str,
    await_promise: bool,
    hint: Option<i64>,
    accept: &F,
) -> Result<Probe, CdpError>
where
    F: Fn(&Value) -> bool,
{
    let mut last_value = None;
    let mut stale = None;
    let mut failure = None;

    for context_id in candidate_contexts(session, hint) {
        match session.evaluate(expression, context_id, await_promise).await {
            Ok(value) if accept(&value) => return Ok(Probe::Found { value, context_id }),
            Ok(value) => {
                if !value.is_null() {
                    last_value = Some(value);
                }
            }
            Err(CdpError::SessionClosed) => return Err(CdpError::SessionClosed),
            Err(e) => {
                trace!("Evaluation in context {:?} failed: {}", context_id, e);
                if e.is_stale_context() {
                    stale = Some(e);
                } else {
                    failure = Some(e);
                }
            }
        }
    }

    if last_value.is_some() {
        return Ok(Probe::Rejected(last_value));
    }
    match stale.or(failure) {
        Some(e) => Err(e),
        None => Ok(Probe::Rejected(None)),
    }
}

async fn probe_with_refresh<F>(
    session: &Session,
    expression: &str,
    await_promise: bool,
    hint: Option<i64>,
    accept: &F,
) -> Result<Probe, CdpError>
where
    F: Fn(&Value) -> bool,
{
    match probe(session, expression, await_promise, hint, accept).await {
        Err(e) if e.is_stale_context() => {
            debug!("Stale context on port {}, refreshing", session.port());
            session.refresh_contexts().await?;
            probe(session, expression, await_promise, None, accept).await
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "automation_tests.rs"]
mod tests;
