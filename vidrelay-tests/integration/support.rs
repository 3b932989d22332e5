//! Mock upstreams and a helper that boots vidrelay against them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use vidrelay_core::VidrelayConfig;
use vidrelay_web::{AppState, build_router, serve};

/// Size of every mock media payload.
pub const MEDIA_LEN: usize = 256 * 1024;

/// Binds `app` on an ephemeral port and serves it in the background.
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Deterministic payload distinguishable per quality.
pub fn media_payload(quality: u32) -> Vec<u8> {
    (0..MEDIA_LEN)
        .map(|i| ((i as u32).wrapping_mul(31).wrapping_add(quality) % 256) as u8)
        .collect()
}

/// Media server: `/media/{quality}` serves a payload, `/broken` dies halfway.
pub async fn spawn_media_server() -> String {
    let app = Router::new()
        .route(
            "/media/{quality}",
            get(|Path(quality): Path<u32>| async move { media_payload(quality) }),
        )
        .route("/broken", get(broken_media));
    format!("http://{}", spawn(app).await)
}

async fn broken_media() -> Response {
    let half = Bytes::from(media_payload(1080)[..MEDIA_LEN / 2].to_vec());
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(half),
        Err(std::io::Error::other("media server crashed")),
    ];
    // Pause before failing so the head and first half reach the client.
    let chunks = futures::stream::iter(chunks).then(|chunk| async move {
        if chunk.is_err() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        chunk
    });
    Body::from_stream(chunks).into_response()
}

/// Player endpoint double with a call counter.
pub struct MockPlayer {
    pub endpoint: String,
    pub calls: Arc<AtomicUsize>,
}

impl MockPlayer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct PlayerState {
    media_base: String,
    calls: Arc<AtomicUsize>,
}

/// Player endpoint answering by video id:
///
/// - `abc`: muxed mp4 at 480 and 1080
/// - `empty`: playable but no formats
/// - `private`: not playable
/// - `broken`: one format whose media dies mid-stream
/// - `gone`: one format whose media URL does not exist
/// - `overload`: 503
pub async fn spawn_player(media_base: &str) -> MockPlayer {
    let calls = Arc::new(AtomicUsize::new(0));
    let state = PlayerState {
        media_base: media_base.to_string(),
        calls: calls.clone(),
    };
    let app = Router::new()
        .route("/player", post(player))
        .with_state(state);
    MockPlayer {
        endpoint: format!("http://{}/player", spawn(app).await),
        calls,
    }
}

async fn player(State(state): State<PlayerState>, Json(request): Json<Value>) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let base = &state.media_base;
    let muxed = |height: u32, path: &str| {
        json!({
            "itag": 18,
            "url": format!("{base}{path}"),
            "mimeType": "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"",
            "height": height,
            "qualityLabel": format!("{height}p"),
            "bitrate": height * 1000,
        })
    };

    let formats = match request["videoId"].as_str().unwrap_or("") {
        "abc" => json!([muxed(480, "/media/480"), muxed(1080, "/media/1080")]),
        "empty" => json!([]),
        "broken" => json!([muxed(1080, "/broken")]),
        "gone" => json!([muxed(720, "/missing")]),
        "private" => {
            return Json(json!({
                "playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": "This video is private"}
            }))
            .into_response();
        }
        "overload" => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    Json(json!({
        "playabilityStatus": {"status": "OK"},
        "videoDetails": {"title": "Mock clip"},
        "streamingData": {"formats": formats}
    }))
    .into_response()
}

/// Remote extraction API double: `/single_post` echoes, `/down` answers 503.
pub async fn spawn_extraction_api() -> String {
    let app = Router::new()
        .route(
            "/single_post",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "code": 200,
                    "received": body,
                    "data": {"medias": [{"media_type": "video", "resource_url": "https://cdn.example/v.mp4"}]}
                }))
            }),
        )
        .route(
            "/down",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "upstream maintenance") }),
        );
    format!("http://{}", spawn(app).await)
}

/// Test configuration pointing at the given mocks.
pub fn config(player_endpoint: &str, proxy_endpoint: &str) -> VidrelayConfig {
    let mut config = VidrelayConfig::for_testing();
    config.resolver.player_endpoint = player_endpoint.to_string();
    config.forwarder.endpoint = proxy_endpoint.to_string();
    config.relay.transfer_window = 16 * 1024;
    config.relay.max_stream_duration = Some(Duration::from_secs(10));
    config
}

/// Boots vidrelay with `config` and returns its base URL.
pub async fn spawn_vidrelay(config: VidrelayConfig) -> String {
    let state = AppState::from_config(&config).unwrap();
    let app = build_router(state, None);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, app, std::future::pending()).await.unwrap();
    });
    format!("http://{addr}")
}
