//! Video URL validation.
//!
//! Decides whether a candidate string is a well-formed URL pointing at a
//! supported video source and extracts the video id from it. Nothing in
//! this module touches the network.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

/// Hosts served by the YouTube family of frontends.
const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

/// Short-link host; the id is the first path segment.
const YOUTU_BE_HOST: &str = "youtu.be";

/// Path prefixes that carry the id as the following segment.
const ID_PATH_PREFIXES: &[&str] = &["shorts", "embed", "v", "live"];

/// Longest id accepted from a generic source.
const MAX_GENERIC_ID_LEN: usize = 64;

fn youtube_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static regex is valid"))
}

fn generic_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex is valid"))
}

/// Reasons a candidate URL is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Input was empty or whitespace.
    #[error("URL is empty")]
    Empty,

    /// Input does not parse as an absolute URL.
    #[error("malformed URL: {reason}")]
    Malformed {
        /// Parser diagnostic.
        reason: String,
    },

    /// Scheme other than http or https.
    #[error("unsupported URL scheme: {scheme}")]
    UnsupportedScheme {
        /// Offending scheme.
        scheme: String,
    },

    /// Host is not a supported video source.
    #[error("unsupported video host: {host}")]
    UnsupportedHost {
        /// Offending host, or empty when the URL has none.
        host: String,
    },

    /// Host is supported but no well-formed video id was found.
    #[error("URL does not contain a valid video id")]
    MissingVideoId,
}

/// Family of a supported host, which decides how the id is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// youtube.com and friends, including youtu.be.
    YouTube,
    /// A configured extra host using the generic id rules.
    Generic,
}

/// A URL that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUrl {
    url: Url,
    video_id: String,
    kind: SourceKind,
}

impl VideoUrl {
    /// The parsed URL as supplied by the client.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Extracted video id.
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Host family the URL belongs to.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Original URL string.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for VideoUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Validates candidate URLs against the set of supported hosts.
///
/// The YouTube family is always supported. Extra hosts (for example a
/// self-hosted mirror) use the generic id rules: the `v` or `id` query
/// parameter, otherwise the last non-empty path segment.
#[derive(Debug, Clone, Default)]
pub struct UrlValidator {
    extra_hosts: Vec<String>,
}

impl UrlValidator {
    /// Creates a validator that only accepts the YouTube family.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator that also accepts the given hosts.
    pub fn with_extra_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra_hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { extra_hosts }
    }

    /// Returns true when `candidate` is a supported video URL.
    pub fn validate(&self, candidate: &str) -> bool {
        self.parse(candidate).is_ok()
    }

    /// Parses and validates `candidate`.
    ///
    /// # Errors
    ///
    /// - `ValidationError::Empty` - Input is blank
    /// - `ValidationError::Malformed` - Input is not an absolute URL
    /// - `ValidationError::UnsupportedScheme` - Scheme is not http/https
    /// - `ValidationError::UnsupportedHost` - Host is not a supported source
    /// - `ValidationError::MissingVideoId` - No well-formed id in the URL
    pub fn parse(&self, candidate: &str) -> Result<VideoUrl, ValidationError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(ValidationError::Empty);
        }

        let url = Url::parse(candidate).map_err(|e| ValidationError::Malformed {
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ValidationError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        }

        // Url lowercases domain hosts while parsing.
        let host = url.host_str().unwrap_or_default().to_string();
        let kind = self
            .classify_host(&host)
            .ok_or(ValidationError::UnsupportedHost { host: host.clone() })?;

        let video_id = match kind {
            SourceKind::YouTube => youtube_video_id(&url, &host),
            SourceKind::Generic => generic_video_id(&url),
        }
        .ok_or(ValidationError::MissingVideoId)?;

        Ok(VideoUrl {
            url,
            video_id,
            kind,
        })
    }

    fn classify_host(&self, host: &str) -> Option<SourceKind> {
        if host == YOUTU_BE_HOST || YOUTUBE_HOSTS.contains(&host) {
            Some(SourceKind::YouTube)
        } else if self.extra_hosts.iter().any(|h| h == host) {
            Some(SourceKind::Generic)
        } else {
            None
        }
    }
}

fn youtube_video_id(url: &Url, host: &str) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let candidate = if host == YOUTU_BE_HOST {
        segments.first().map(|s| s.to_string())
    } else if segments.first() == Some(&"watch") {
        query_value(url, "v")
    } else {
        match segments.as_slice() {
            [prefix, id, ..] if ID_PATH_PREFIXES.contains(prefix) => Some(id.to_string()),
            _ => None,
        }
    }?;

    youtube_id_pattern()
        .is_match(&candidate)
        .then_some(candidate)
}

fn generic_video_id(url: &Url) -> Option<String> {
    let candidate = query_value(url, "v")
        .or_else(|| query_value(url, "id"))
        .or_else(|| {
            url.path_segments()
                .and_then(|s| s.filter(|seg| !seg.is_empty()).next_back())
                .map(str::to_string)
        })?;

    (candidate.len() <= MAX_GENERIC_ID_LEN && generic_id_pattern().is_match(&candidate))
        .then_some(candidate)
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}
