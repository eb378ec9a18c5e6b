//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatmirror_cdp::CdpError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients as `{ok: false, reason}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The IDE could not be reached or answered badly.
    #[error(transparent)]
    Cdp(#[from] CdpError),

    /// The request is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The IDE has no chat view to capture.
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest(reason.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Cdp(CdpError::CallTimeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Cdp(e) if e.is_connection_error() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Cdp(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({"ok": false, "reason": self.to_string()});
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let unreachable = ApiError::from(CdpError::Unreachable {
            port: 9000,
            reason: "refused".to_string(),
        });
        assert_eq!(unreachable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(CdpError::NotFound { port: 9000 }).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(CdpError::CallTimeout {
                method: "Runtime.evaluate".to_string(),
                timeout_ms: 10,
            })
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(CdpError::Evaluation("boom".to_string())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ApiError::bad_request("no").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_reason_is_error_text() {
        let err = ApiError::bad_request("message is required");
        assert_eq!(err.to_string(), "message is required");
    }
}
