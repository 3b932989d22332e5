//! Manifest resolution against a video source's player endpoint.
//!
//! A resolver turns a validated [`VideoUrl`] into the [`Manifest`] of
//! encodings the source currently offers. It performs one network round
//! trip, never retries and never caches; retry policy belongs to callers.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::source::manifest::{EncodingDescriptor, Locator, Manifest};
use crate::source::validator::VideoUrl;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while resolving a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Network, timeout or server-side failure reaching the source.
    #[error("video source unreachable: {0}")]
    Unreachable(String),

    /// URL is well-formed but the video cannot be retrieved
    /// (private, removed, region-locked).
    #[error("video unavailable: {0}")]
    Unsupported(String),

    /// Source answered but offered no usable encodings.
    #[error("video source returned no usable encodings")]
    EmptyManifest,

    /// The request was cancelled before resolution finished.
    #[error("resolution cancelled")]
    Cancelled,
}

/// Obtains the manifest of encodings for a video.
#[async_trait::async_trait]
pub trait ManifestResolver: Send + Sync {
    /// Resolves `url` into a non-empty manifest.
    ///
    /// # Errors
    ///
    /// - `ResolutionError::Unreachable` - Transport failure or 5xx answer
    /// - `ResolutionError::Unsupported` - Video cannot be retrieved
    /// - `ResolutionError::EmptyManifest` - Zero usable encodings
    /// - `ResolutionError::Cancelled` - `cancel` fired first
    async fn resolve(
        &self,
        url: &VideoUrl,
        cancel: &CancellationToken,
    ) -> Result<Manifest, ResolutionError>;
}

/// Resolver speaking the JSON player protocol used by YouTube-style sources.
///
/// Posts a player request for the video id and reads the `streamingData`
/// section of the answer. Formats without a direct URL (cipher protected)
/// are skipped because they cannot be opened without further work.
pub struct PlayerApiResolver {
    client: Client,
    config: ResolverConfig,
}

impl PlayerApiResolver {
    /// Creates a resolver with its own connection pool.
    ///
    /// # Errors
    ///
    /// - `ResolutionError::Unreachable` - The HTTP client could not be built
    pub fn new(config: ResolverConfig) -> Result<Self, ResolutionError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ResolutionError::Unreachable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn player_request(&self, video_id: &str) -> Value {
        json!({
            "context": {
                "client": {
                    "clientName": self.config.client_name,
                    "clientVersion": self.config.client_version,
                    "hl": "en"
                }
            },
            "videoId": video_id,
            "contentCheckOk": true,
            "racyCheckOk": true
        })
    }

    async fn fetch_player_response(&self, video_id: &str) -> Result<Value, ResolutionError> {
        let response = self
            .client
            .post(&self.config.player_endpoint)
            .json(&self.player_request(video_id))
            .send()
            .await
            .map_err(|e| ResolutionError::Unreachable(e.to_string()))?;

        if let Some(error) = classify_status(response.status()) {
            return Err(error);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ResolutionError::Unreachable(format!("invalid player response: {e}")))
    }
}

#[async_trait::async_trait]
impl ManifestResolver for PlayerApiResolver {
    async fn resolve(
        &self,
        url: &VideoUrl,
        cancel: &CancellationToken,
    ) -> Result<Manifest, ResolutionError> {
        let video_id = url.video_id();
        // Generic hosts share the player endpoint; see `SourceConfig`.
        debug!(
            video_id,
            kind = ?url.kind(),
            endpoint = %self.config.player_endpoint,
            "Requesting player response"
        );

        let data = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResolutionError::Cancelled),
            result = self.fetch_player_response(video_id) => result?,
        };

        manifest_from_player_response(video_id, &data, self.config.include_adaptive)
    }
}

/// Extracts a manifest from a decoded player response.
///
/// # Errors
///
/// - `ResolutionError::Unsupported` - Playability status is not `OK`
/// - `ResolutionError::EmptyManifest` - No format carries a direct URL
pub fn manifest_from_player_response(
    video_id: &str,
    data: &Value,
    include_adaptive: bool,
) -> Result<Manifest, ResolutionError> {
    let status = data["playabilityStatus"]["status"].as_str().unwrap_or("");
    if status != "OK" {
        let reason = data["playabilityStatus"]["reason"]
            .as_str()
            .unwrap_or("no playability status");
        warn!(video_id, status, reason, "Video is not playable");
        return Err(ResolutionError::Unsupported(reason.to_string()));
    }

    let streaming = &data["streamingData"];
    let mut groups = vec![&streaming["formats"]];
    if include_adaptive {
        groups.push(&streaming["adaptiveFormats"]);
    }

    let mut skipped = 0usize;
    let mut encodings = Vec::new();
    for format in groups
        .into_iter()
        .filter_map(Value::as_array)
        .flatten()
    {
        match descriptor_from_format(format) {
            Some(descriptor) => encodings.push(descriptor),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(video_id, skipped, "Skipped formats without a direct URL");
    }

    let manifest = Manifest::new(video_id, encodings).ok_or(ResolutionError::EmptyManifest)?;
    Ok(match data["videoDetails"]["title"].as_str() {
        Some(title) => manifest.with_title(title),
        None => manifest,
    })
}

fn descriptor_from_format(format: &Value) -> Option<EncodingDescriptor> {
    let url = format["url"].as_str().filter(|u| !u.is_empty())?;
    let mime = ParsedMime::parse(format["mimeType"].as_str().unwrap_or(""));

    let label = format["qualityLabel"].as_str().map(str::to_string);
    let quality_rank = format["height"]
        .as_u64()
        .and_then(|h| u32::try_from(h).ok())
        .or_else(|| label.as_deref().and_then(rank_from_label))
        .unwrap_or(0);

    let bitrate = format["bitrate"]
        .as_u64()
        .or_else(|| format["bitrate"].as_str().and_then(|b| b.parse().ok()));

    Some(EncodingDescriptor {
        container: mime.container,
        mime_type: mime.essence,
        quality_rank,
        bitrate,
        has_video: mime.has_video,
        has_audio: mime.has_audio,
        label,
        locator: Locator::new(url),
    })
}

/// Leading digits of a label such as `1080p60`.
fn rank_from_label(label: &str) -> Option<u32> {
    let digits: String = label.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Pieces of a `type/subtype; codecs="a, b"` MIME string.
struct ParsedMime {
    container: String,
    essence: Option<String>,
    has_video: bool,
    has_audio: bool,
}

impl ParsedMime {
    fn parse(raw: &str) -> Self {
        let mut parts = raw.split(';');
        let essence = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let (kind, subtype) = essence.split_once('/').unwrap_or(("", ""));

        let codecs: Vec<String> = parts
            .filter_map(|p| p.trim().strip_prefix("codecs="))
            .flat_map(|c| c.trim_matches('"').split(',').map(|s| s.trim().to_string()))
            .filter(|c| !c.is_empty())
            .collect();

        // Muxed renditions list two codecs; a single codec follows the
        // MIME top-level type.
        let (has_video, has_audio) = match (kind, codecs.len()) {
            (_, n) if n >= 2 => (true, true),
            ("audio", _) => (false, true),
            ("video", 1) => (true, false),
            ("video", _) => (true, true),
            _ => (false, false),
        };

        Self {
            container: subtype.to_string(),
            essence: (!kind.is_empty() && !subtype.is_empty()).then(|| essence.clone()),
            has_video,
            has_audio,
        }
    }
}

/// Maps a player endpoint status to the error it implies, if any.
///
/// 4xx answers mean the video itself cannot be served; anything else
/// unsuccessful is treated as the source being unreachable.
pub fn classify_status(status: StatusCode) -> Option<ResolutionError> {
    if status.is_success() {
        None
    } else if status.is_client_error() {
        Some(ResolutionError::Unsupported(format!("player endpoint answered {status}")))
    } else {
        Some(ResolutionError::Unreachable(format!("player endpoint answered {status}")))
    }
}
