//! The download pipeline: validate, resolve, select, relay.
//!
//! [`DownloadPipeline::prepare`] runs everything up to the selection so a
//! caller can still answer with an error status. [`DownloadPipeline::relay`]
//! then streams the chosen encoding into a sink.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::VidrelayConfig;
use crate::relay::{
    ByteSink, HttpSourceOpener, RelayError, RelayOptions, RelayReport, SourceOpener, relay,
};
use crate::selection::{RankingPolicy, SelectedEncoding, select};
use crate::source::{
    Manifest, ManifestResolver, PlayerApiResolver, ResolutionError, UrlValidator,
    ValidationError, VideoUrl,
};

/// Errors from any stage of the download pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl PipelineError {
    /// True when the client sent something unusable.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}

/// Outcome of the stages that precede the first byte.
#[derive(Debug, Clone)]
pub struct PreparedDownload {
    pub url: VideoUrl,
    pub manifest: Manifest,
    pub selected: SelectedEncoding,
}

impl PreparedDownload {
    /// Content type the relay will declare.
    pub fn content_type(&self) -> String {
        self.selected.content_type()
    }

    /// Suggested file name, `<video_id>.<container>`.
    pub fn file_name(&self) -> String {
        let container = &self.selected.descriptor().container;
        if container.is_empty() {
            self.url.video_id().to_string()
        } else {
            format!("{}.{}", self.url.video_id(), container)
        }
    }
}

/// Validator, resolver, policy and opener wired together.
///
/// Holds no per-request state; share it behind an `Arc` across requests.
pub struct DownloadPipeline {
    validator: UrlValidator,
    resolver: Arc<dyn ManifestResolver>,
    opener: Arc<dyn SourceOpener>,
    policy: Box<dyn RankingPolicy>,
    options: RelayOptions,
}

impl DownloadPipeline {
    /// Assembles a pipeline from its parts.
    pub fn new(
        validator: UrlValidator,
        resolver: Arc<dyn ManifestResolver>,
        opener: Arc<dyn SourceOpener>,
        policy: Box<dyn RankingPolicy>,
        options: RelayOptions,
    ) -> Self {
        Self {
            validator,
            resolver,
            opener,
            policy,
            options,
        }
    }

    /// Production pipeline: player API resolver and HTTP source opener.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Resolution` - Resolver client could not be built
    /// - `PipelineError::Relay` - Source client could not be built
    pub fn from_config(config: &VidrelayConfig) -> Result<Self, PipelineError> {
        let resolver = PlayerApiResolver::new(config.resolver.clone())?;
        let opener = HttpSourceOpener::new(&config.relay)?;
        Ok(Self::new(
            UrlValidator::with_extra_hosts(config.source.extra_hosts.iter().cloned()),
            Arc::new(resolver),
            Arc::new(opener),
            config.relay.selection_policy.build(),
            RelayOptions::from(&config.relay),
        ))
    }

    /// Replaces the ranking policy.
    pub fn with_policy(mut self, policy: Box<dyn RankingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Validates, resolves and selects.
    ///
    /// The resolver is only called for URLs that pass validation.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Validation` - `raw_url` is not a supported video URL
    /// - `PipelineError::Resolution` - Manifest could not be obtained
    pub async fn prepare(
        &self,
        raw_url: &str,
        cancel: &CancellationToken,
    ) -> Result<PreparedDownload, PipelineError> {
        let url = self.validator.parse(raw_url).inspect_err(|e| {
            debug!(error = %e, "Rejected download URL");
        })?;

        let manifest = self
            .resolver
            .resolve(&url, cancel)
            .await
            .inspect_err(|e| warn!(video_id = url.video_id(), error = %e, "Resolution failed"))?;

        let selected = select(&manifest, self.policy.as_ref());
        info!(
            video_id = url.video_id(),
            offered = manifest.len(),
            container = %selected.descriptor().container,
            quality_rank = selected.descriptor().quality_rank,
            "Encoding selected"
        );

        Ok(PreparedDownload {
            url,
            manifest,
            selected,
        })
    }

    /// Streams the prepared encoding into `sink`.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Relay` - See [`relay`]
    pub async fn relay<S>(
        &self,
        prepared: &PreparedDownload,
        sink: S,
        cancel: &CancellationToken,
    ) -> Result<RelayReport, PipelineError>
    where
        S: ByteSink,
    {
        Ok(relay(
            &prepared.selected,
            self.opener.as_ref(),
            sink,
            &self.options,
            cancel,
        )
        .await?)
    }

    /// Runs every stage for `raw_url`.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Validation` - `raw_url` is not a supported video URL
    /// - `PipelineError::Resolution` - Manifest could not be obtained
    /// - `PipelineError::Relay` - Streaming failed
    pub async fn run<S>(
        &self,
        raw_url: &str,
        sink: S,
        cancel: &CancellationToken,
    ) -> Result<RelayReport, PipelineError>
    where
        S: ByteSink,
    {
        let prepared = self.prepare(raw_url, cancel).await?;
        self.relay(&prepared, sink, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{HighestQuality, LowestBandwidth};
    use crate::source::{EncodingDescriptor, Locator};
    use crate::testing::{MemoryOpener, MemorySink, StaticResolver};

    fn manifest() -> Manifest {
        Manifest::new(
            "abc",
            vec![
                EncodingDescriptor::new("mp4", 480, Locator::new("mem://480")).with_bitrate(500_000),
                EncodingDescriptor::new("webm", 1080, Locator::new("mem://1080"))
                    .with_bitrate(4_000_000),
            ],
        )
        .unwrap()
    }

    fn pipeline(opener: MemoryOpener) -> DownloadPipeline {
        DownloadPipeline::new(
            UrlValidator::with_extra_hosts(["video.example"]),
            Arc::new(StaticResolver::new(manifest())),
            Arc::new(opener),
            Box::new(HighestQuality),
            RelayOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_prepare_names_file_after_selection() {
        let pipeline = pipeline(MemoryOpener::new(vec![0u8; 10], 4));
        let prepared = pipeline
            .prepare("https://video.example/watch?id=abc", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(prepared.selected.descriptor().quality_rank, 1080);
        assert_eq!(prepared.content_type(), "video/webm");
        assert_eq!(prepared.file_name(), "abc.webm");
    }

    #[tokio::test]
    async fn test_policy_changes_selection_and_opened_locator() {
        let opener = MemoryOpener::new(vec![1u8; 10], 4);
        let probe = opener.probe();
        let pipeline = pipeline(opener).with_policy(Box::new(LowestBandwidth));

        pipeline
            .run(
                "https://video.example/watch?id=abc",
                MemorySink::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(probe.locators(), vec!["mem://480".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_url_is_client_error() {
        let pipeline = pipeline(MemoryOpener::new(vec![], 1));
        let err = pipeline
            .prepare("ftp://video.example/abc", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }
}
