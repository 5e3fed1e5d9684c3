/// Unified error handling module
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::BundleStatus;

/// Data-integrity faults raised while reconciling inbound state. Never
/// fatal: the offending datum is rejected, prior state is retained, and
/// the engine keeps running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid bundle transition {from:?} -> {to:?} for {bundle_id}")]
    InvalidTransition {
        bundle_id: String,
        from: BundleStatus,
        to: BundleStatus,
    },
    #[error("unknown bundle {0}")]
    UnknownBundle(String),
}

/// Unified error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Errors surfaced on the HTTP read/command surface. Command faults are
/// kept distinct from upstream transport faults so an operator can tell
/// "link down" apart from "request rejected".
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("command rejected: {0}")]
    Command(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            ApiError::Upstream(e) => {
                if let Some(status) = e.status() {
                    (
                        match status.as_u16() {
                            403 => "UPSTREAM_403",
                            404 => "UPSTREAM_404",
                            429 => "UPSTREAM_429",
                            500..=599 => "UPSTREAM_5XX",
                            _ => "UPSTREAM_ERROR",
                        },
                        format!("upstream request failed: {}", e),
                    )
                } else {
                    ("UPSTREAM_ERROR", format!("upstream request failed: {}", e))
                }
            }
            ApiError::Command(msg) => ("COMMAND_REJECTED", msg.clone()),
            ApiError::NotFound(msg) => ("NOT_FOUND", msg.clone()),
            ApiError::InvalidInput(msg) => ("INVALID_INPUT", msg.clone()),
        };

        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        // Always HTTP 200 with ok=false; the envelope carries the fault
        (StatusCode::OK, Json(error_response)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
