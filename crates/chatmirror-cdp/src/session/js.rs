//! JavaScript evaluation and context selection.

use serde_json::{Value, json};
use tracing::debug;

use crate::error::CdpError;
use crate::protocol::ExceptionDetails;

use super::contexts::ExecutionContext;
use super::core::Session;

impl Session {
    /// Evaluate an expression and return its value by value.
    ///
    /// A thrown exception becomes [`CdpError::Evaluation`].
    pub async fn evaluate(
        &self,
        expression: &str,
        context_id: Option<i64>,
        await_promise: bool,
    ) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": await_promise,
                })),
                context_id,
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = serde_json::from_value::<ExceptionDetails>(exception.clone())
                .map(|details| details.message())
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CdpError::Evaluation(message));
        }

        let remote = result
            .get("result")
            .ok_or_else(|| CdpError::InvalidResponse("evaluate returned no result".to_string()))?;
        Ok(remote.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Known contexts, newest first.
    pub fn contexts(&self) -> Vec<ExecutionContext> {
        self.shared.contexts.newest_first()
    }

    /// Contexts in the order evaluations should try them.
    pub fn preferred_contexts(&self) -> Vec<ExecutionContext> {
        self.shared.contexts.preferred()
    }

    pub fn has_context(&self, id: i64) -> bool {
        self.shared.contexts.contains(id)
    }

    /// Forget known contexts and have the target announce them again.
    pub async fn refresh_contexts(&self) -> Result<(), CdpError> {
        self.shared.contexts.clear();
        self.call("Runtime.disable", None, None).await?;
        self.call("Runtime.enable", None, None).await?;
        tokio::time::sleep(self.options().context_settle).await;
        debug!(
            "Refreshed contexts on port {}: {} known",
            self.port(),
            self.shared.contexts.newest_first().len()
        );
        Ok(())
    }
}
