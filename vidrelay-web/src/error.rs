//! API error responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;
use vidrelay_core::{PipelineError, RelayError};

/// Message sent when a download fails before its first byte.
pub const DOWNLOAD_FAILED: &str = "Failed to download video";

/// Message sent for unusable download URLs.
pub const INVALID_VIDEO_URL: &str = "Invalid video URL";

/// Errors returned by API handlers, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client sent an unusable request.
    #[error("{0}")]
    BadRequest(String),

    /// A remote collaborator failed.
    #[error("{0}")]
    Upstream(String),

    /// Something went wrong inside the server.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(_) => ApiError::BadRequest(INVALID_VIDEO_URL.to_string()),
            PipelineError::Resolution(e) => {
                error!(error = %e, "Download failed during resolution");
                ApiError::Upstream(DOWNLOAD_FAILED.to_string())
            }
            PipelineError::Relay(e) => ApiError::from(e),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        error!(error = %err, "Download failed before streaming");
        ApiError::Upstream(DOWNLOAD_FAILED.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
