//! vidrelay core - video URL validation, manifest resolution, format
//! selection and byte relaying
//!
//! This crate holds everything the relay service does apart from HTTP
//! routing: the download pipeline and its stages, the proxy forwarder,
//! configuration and tracing setup.

pub mod config;
pub mod forwarder;
pub mod pipeline;
pub mod relay;
pub mod selection;
pub mod source;
pub mod tracing_setup;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export main types for convenient access
pub use config::{ConfigError, VidrelayConfig};
pub use forwarder::{ForwardError, ProxyForwarder};
pub use pipeline::{DownloadPipeline, PipelineError, PreparedDownload};
pub use relay::{RelayError, RelayReport};
pub use selection::{RankingPolicy, SelectedEncoding, SelectionPolicy, select, select_highest};
pub use source::{
    EncodingDescriptor, Manifest, ManifestResolver, ResolutionError, UrlValidator,
    ValidationError, VideoUrl,
};

/// Errors that can bubble up from any vidrelay subsystem.
#[derive(Debug, thiserror::Error)]
pub enum VidrelayError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Proxy error: {0}")]
    Forward(#[from] ForwardError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for VidrelayError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(e) => VidrelayError::Validation(e),
            PipelineError::Resolution(e) => VidrelayError::Resolution(e),
            PipelineError::Relay(e) => VidrelayError::Relay(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, VidrelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_errors_keep_their_stage() {
        let err: VidrelayError = PipelineError::Validation(ValidationError::Empty).into();
        assert!(matches!(err, VidrelayError::Validation(ValidationError::Empty)));

        let err: VidrelayError = PipelineError::Resolution(ResolutionError::EmptyManifest).into();
        assert!(matches!(
            err,
            VidrelayError::Resolution(ResolutionError::EmptyManifest)
        ));

        let err: VidrelayError = PipelineError::Relay(RelayError::DeadlineExceeded).into();
        assert!(matches!(err, VidrelayError::Relay(RelayError::DeadlineExceeded)));
    }
}
