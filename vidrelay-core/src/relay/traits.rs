//! Abstractions the relay copies between.
//!
//! A [`SourceOpener`] turns a locator into a [`ByteSource`]; the relay then
//! moves chunks from that source into a [`ByteSink`]. Keeping both ends
//! behind traits lets the same copy loop serve HTTP responses, files,
//! stdout and in-memory test doubles.

use bytes::Bytes;
use thiserror::Error;

use crate::source::Locator;

/// Errors that end a relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The byte source could not be opened or failed mid-stream.
    #[error("media source failed: {0}")]
    SourceFailed(String),

    /// The sink rejected data or the client went away.
    #[error("output sink failed: {0}")]
    SinkFailed(String),

    /// The request's cancellation token fired.
    #[error("relay cancelled")]
    Cancelled,

    /// The configured maximum stream duration elapsed.
    #[error("relay exceeded maximum stream duration")]
    DeadlineExceeded,
}

impl RelayError {
    /// True when the failure originated downstream of the relay.
    pub fn is_sink_side(&self) -> bool {
        matches!(self, RelayError::SinkFailed(_))
    }
}

/// Failure reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    /// Creates a sink error from anything displayable.
    pub fn new(reason: impl std::fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

impl From<SinkError> for RelayError {
    fn from(err: SinkError) -> Self {
        RelayError::SinkFailed(err.0)
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError(err.to_string())
    }
}

/// Pull-based producer of media bytes.
#[async_trait::async_trait]
pub trait ByteSource: Send {
    /// Returns the next chunk, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// - `RelayError::SourceFailed` - Upstream disconnected or errored
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RelayError>;

    /// Total length announced by the source, when known.
    fn content_length(&self) -> Option<u64> {
        None
    }
}

/// Opens byte sources for locators.
#[async_trait::async_trait]
pub trait SourceOpener: Send + Sync {
    /// Opens a stream for `locator`.
    ///
    /// # Errors
    ///
    /// - `RelayError::SourceFailed` - Connection failed or was refused
    async fn open(&self, locator: &Locator) -> Result<Box<dyn ByteSource>, RelayError>;
}

/// Destination of relayed bytes.
///
/// The relay always calls `declare_content_type` exactly once before the
/// first `write_chunk`, then either `finish` or `abort`.
#[async_trait::async_trait]
pub trait ByteSink: Send {
    /// Declares the content type of the bytes that follow.
    ///
    /// # Errors
    ///
    /// - `SinkError` - The sink can no longer accept a declaration
    async fn declare_content_type(&mut self, content_type: &str) -> Result<(), SinkError>;

    /// Writes one chunk.
    ///
    /// # Errors
    ///
    /// - `SinkError` - The sink is closed or the write failed
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkError>;

    /// Resolves once the consumer has gone away. Sinks that cannot
    /// observe this never resolve.
    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }

    /// Completes the stream after the last chunk.
    ///
    /// # Errors
    ///
    /// - `SinkError` - Flushing or closing failed
    async fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Terminates the stream early so the consumer can tell it is truncated.
    async fn abort(&mut self, _reason: &str) {}
}
