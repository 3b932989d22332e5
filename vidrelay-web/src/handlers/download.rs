//! Download endpoint streaming the selected encoding to the client.
//!
//! Validation, resolution, the opening of the media source and the first
//! read all finish before the response head is sent, so their failures
//! still become JSON errors. After that the relay runs in its own task and
//! feeds the body through a bounded channel; a later failure can only cut
//! the body short.

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::Response;
use futures::{StreamExt, stream};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};
use vidrelay_core::relay::{ChannelReceiver, channel_sink};
use vidrelay_core::{PipelineError, RelayReport};

use super::UrlRequest;
use crate::error::{ApiError, INVALID_VIDEO_URL};
use crate::server::AppState;

/// `POST /api/youtube-download`: streams the best encoding of `url`.
///
/// # Errors
///
/// - `ApiError::BadRequest` - Body unusable or URL not a supported video
/// - `ApiError::Upstream` - Resolution failed or the media source could not
///   be opened
/// - `ApiError::Internal` - Relay task died before writing a byte
pub async fn api_download(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let Some(raw_url) = request.url else {
        return Err(ApiError::BadRequest(INVALID_VIDEO_URL.to_string()));
    };

    let cancel = CancellationToken::new();
    let prepared = state.pipeline.prepare(&raw_url, &cancel).await?;

    let (sink, ChannelReceiver { content_type, mut body }) =
        channel_sink(state.channel_capacity);
    let pipeline = state.pipeline.clone();
    let relay_cancel = cancel.clone();
    let relay_prepared = prepared.clone();
    let span = info_span!("relay", video_id = %prepared.url.video_id());
    let relay_task = tokio::spawn(
        async move { pipeline.relay(&relay_prepared, sink, &relay_cancel).await }
            .instrument(span),
    );

    // Dropping the handler or the body (client gone) cancels the relay.
    let guard = cancel.drop_guard();

    let Ok(content_type) = content_type.await else {
        return Err(relay_failure(relay_task.await));
    };

    // Hold the head back until a byte exists, so a failing first read is
    // still reported as a JSON error.
    let first_chunk = match body.recv().await {
        Some(Ok(chunk)) => Some(chunk),
        Some(Err(_)) => return Err(relay_failure(relay_task.await)),
        None => match relay_task.await {
            Ok(Ok(_)) => None,
            outcome => return Err(relay_failure(outcome)),
        },
    };

    debug!(%content_type, file_name = %prepared.file_name(), "Streaming download");

    let rest = stream::unfold((body, guard), |(mut body, guard)| async move {
        body.recv().await.map(|chunk| (chunk, (body, guard)))
    });
    let body_stream = stream::iter(first_chunk.map(Ok)).chain(rest);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", prepared.file_name()),
        )
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Error for a relay that ended before its first byte reached the client.
fn relay_failure(outcome: Result<Result<RelayReport, PipelineError>, JoinError>) -> ApiError {
    match outcome {
        Ok(Err(e)) => ApiError::from(e),
        Ok(Ok(_)) => ApiError::Internal("relay ended before streaming".to_string()),
        Err(e) => {
            warn!(error = %e, "Relay task failed");
            ApiError::Internal("relay task failed".to_string())
        }
    }
}
