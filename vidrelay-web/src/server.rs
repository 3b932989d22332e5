//! JSON API server for vidrelay
//!
//! Wires the download pipeline and the proxy forwarder into an axum router
//! and runs it until Ctrl-C.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;
use vidrelay_core::{DownloadPipeline, ProxyForwarder, VidrelayConfig, VidrelayError};

use crate::handlers::{api_download, api_health, api_proxy};

/// Shared, immutable state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DownloadPipeline>,
    pub forwarder: ProxyForwarder,
    /// Body chunks buffered per download.
    pub channel_capacity: usize,
}

impl AppState {
    /// Builds production state from configuration.
    ///
    /// # Errors
    ///
    /// - `VidrelayError::Resolution` / `VidrelayError::Relay` - HTTP clients
    ///   for the pipeline could not be built
    /// - `VidrelayError::Forward` - HTTP client for the forwarder could not
    ///   be built
    pub fn from_config(config: &VidrelayConfig) -> Result<Self, VidrelayError> {
        if !config.forwarder.has_credentials() {
            warn!("Proxy credentials are not configured; the remote API will likely reject requests");
        }
        Ok(Self {
            pipeline: Arc::new(DownloadPipeline::from_config(config)?),
            forwarder: ProxyForwarder::new(config.forwarder.clone())?,
            channel_capacity: config.relay.channel_capacity,
        })
    }
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("startup failed: {0}")]
    Startup(#[from] VidrelayError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the application router.
///
/// When `static_dir` is set, unmatched paths are served from it.
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/api/youtube", post(api_proxy))
        .route("/api/youtube-download", post(api_download))
        .route("/api/health", get(api_health));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(
        TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = Uuid::new_v4();
            info_span!(
                "request",
                %request_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        }),
    )
    .layer(CorsLayer::permissive())
    .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// - `std::io::Error` - Accepting connections failed
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Runs the server described by `config` until Ctrl-C.
///
/// # Errors
///
/// - `ServerError::Startup` - State could not be built
/// - `ServerError::Io` - Binding or serving failed
pub async fn run_server(config: VidrelayConfig) -> Result<(), ServerError> {
    let state = AppState::from_config(&config)?;
    let app = build_router(state, config.server.static_dir.as_deref());

    let listener = TcpListener::bind(config.server.bind_addr()).await?;
    info!(
        address = %listener.local_addr()?,
        policy = %config.relay.selection_policy,
        "vidrelay server running"
    );

    serve(listener, app, shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
