//! Encoding descriptors and the manifest a video source resolves to.

use std::fmt;

use serde::Serialize;

/// Opaque handle sufficient to open a byte stream for one encoding.
///
/// For the HTTP resolver this is a direct media URL. The relay never
/// inspects it beyond handing it to a [`SourceOpener`](crate::relay::SourceOpener).
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Wraps a raw locator string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw locator string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Locators are signed URLs; keep them out of logs.
impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.0.chars().take(32).collect();
        if shown.len() < self.0.len() {
            write!(f, "Locator({shown}...)")
        } else {
            write!(f, "Locator({shown})")
        }
    }
}

/// One available rendition of a remote video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingDescriptor {
    /// Short container tag such as `mp4` or `webm`.
    pub container: String,
    /// MIME essence reported by the source, e.g. `video/mp4`.
    pub mime_type: Option<String>,
    /// Ordered quality class; vertical resolution for video renditions.
    pub quality_rank: u32,
    /// Average bitrate in bits per second, when known.
    pub bitrate: Option<u64>,
    /// Rendition carries a video track.
    pub has_video: bool,
    /// Rendition carries an audio track.
    pub has_audio: bool,
    /// Human label such as `720p`.
    pub label: Option<String>,
    /// Where the bytes live.
    pub locator: Locator,
}

impl EncodingDescriptor {
    /// Creates a muxed audio+video descriptor with no MIME or bitrate info.
    pub fn new(container: impl Into<String>, quality_rank: u32, locator: Locator) -> Self {
        Self {
            container: container.into(),
            mime_type: None,
            quality_rank,
            bitrate: None,
            has_video: true,
            has_audio: true,
            label: None,
            locator,
        }
    }

    /// Sets the reported MIME essence.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the bitrate in bits per second.
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Content type to declare to a client receiving this encoding.
    ///
    /// Uses the MIME type the source reported when there is one, otherwise
    /// guesses from the container tag, falling back to `video/<container>`
    /// for tags the guesser does not know.
    pub fn content_type(&self) -> String {
        if let Some(mime) = &self.mime_type {
            return mime.clone();
        }

        match mime_guess::from_ext(&self.container).first() {
            Some(mime) => mime.essence_str().to_string(),
            None if self.container.is_empty() => "application/octet-stream".to_string(),
            None => format!("video/{}", self.container),
        }
    }
}

/// Non-empty set of encodings for one video.
///
/// Construction fails on an empty list, so holders never need to handle
/// the empty case. Order is preserved only to break selection ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    video_id: String,
    title: Option<String>,
    encodings: Vec<EncodingDescriptor>,
}

impl Manifest {
    /// Builds a manifest, returning `None` when `encodings` is empty.
    pub fn new(video_id: impl Into<String>, encodings: Vec<EncodingDescriptor>) -> Option<Self> {
        if encodings.is_empty() {
            return None;
        }
        Some(Self {
            video_id: video_id.into(),
            title: None,
            encodings,
        })
    }

    /// Attaches the video title reported by the source.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Id of the video the manifest describes.
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Title reported by the source.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// All encodings in first-seen order.
    pub fn encodings(&self) -> &[EncodingDescriptor] {
        &self.encodings
    }

    /// Number of encodings; always at least one.
    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub(crate) fn first(&self) -> &EncodingDescriptor {
        &self.encodings[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_manifest_is_unrepresentable() {
        assert!(Manifest::new("abc", Vec::new()).is_none());
        let manifest =
            Manifest::new("abc", vec![EncodingDescriptor::new("mp4", 360, Locator::new("x"))])
                .unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.video_id(), "abc");
    }

    #[test]
    fn test_content_type_prefers_reported_mime() {
        let descriptor = EncodingDescriptor::new("mp4", 720, Locator::new("x"))
            .with_mime_type("video/mp4");
        assert_eq!(descriptor.content_type(), "video/mp4");

        let audio = EncodingDescriptor::new("mp4", 0, Locator::new("x")).with_mime_type("audio/mp4");
        assert_eq!(audio.content_type(), "audio/mp4");
    }

    #[test]
    fn test_content_type_from_container() {
        assert_eq!(
            EncodingDescriptor::new("mp4", 1080, Locator::new("x")).content_type(),
            "video/mp4"
        );
        assert_eq!(
            EncodingDescriptor::new("webm", 1080, Locator::new("x")).content_type(),
            "video/webm"
        );
        assert_eq!(
            EncodingDescriptor::new("", 1080, Locator::new("x")).content_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_locator_debug_is_truncated() {
        let locator = Locator::new(format!("https://media.example/{}", "a".repeat(100)));
        let shown = format!("{locator:?}");
        assert!(shown.ends_with("...)"));
        assert!(shown.len() < 50);
    }
}
