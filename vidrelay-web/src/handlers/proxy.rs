//! Proxy endpoint forwarding URLs to the remote extraction API.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::Value;
use tracing::{error, info};
use vidrelay_core::ForwardError;

use super::UrlRequest;
use crate::error::ApiError;
use crate::server::AppState;

/// Message sent when upstream error text is withheld.
const UPSTREAM_FAILED: &str = "Upstream request failed";

/// `POST /api/youtube`: relays the remote API's JSON for `url`.
///
/// # Errors
///
/// - `ApiError::BadRequest` - Body is not JSON or has no `url`
/// - `ApiError::Upstream` - Remote API failed; carries its error text unless
///   `forwarder.expose_upstream_errors` is off
pub async fn api_proxy(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let url = request
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing url".to_string()))?;

    match state.forwarder.forward(&url).await {
        Ok(body) => {
            info!("Proxy request answered");
            Ok(Json(body))
        }
        Err(ForwardError::UpstreamFailed(message)) => {
            error!(error = %message, "Proxy request failed");
            if state.forwarder.config().expose_upstream_errors {
                Err(ApiError::Upstream(message))
            } else {
                Err(ApiError::Upstream(UPSTREAM_FAILED.to_string()))
            }
        }
    }
}
