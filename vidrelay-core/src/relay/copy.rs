//! The copy loop moving bytes from a source to a sink.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::relay::traits::{ByteSink, RelayError, SourceOpener};
use crate::selection::SelectedEncoding;

/// Tunables for one relay.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Largest chunk handed to the sink in one write.
    pub transfer_window: usize,
    /// Upper bound on the whole transfer, if any.
    pub max_duration: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            transfer_window: 64 * 1024,
            max_duration: None,
        }
    }
}

impl From<&RelayConfig> for RelayOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            transfer_window: config.transfer_window,
            max_duration: config.max_stream_duration,
        }
    }
}

/// Summary of a completed relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    /// Content type declared to the sink.
    pub content_type: String,
    /// Bytes delivered to the sink.
    pub bytes_written: u64,
    /// Chunks read from the source.
    pub chunks_read: u64,
    /// Wall time from open to finish.
    pub elapsed: Duration,
}

/// Relays the selected encoding into `sink`.
///
/// Opens the source through `opener`, declares the encoding's content type,
/// then copies chunks in order, splitting any chunk larger than the
/// transfer window. The sink is finished on success and aborted when the
/// source fails, is cancelled or runs past the deadline. Source and sink
/// are owned by this call and released on every return path.
///
/// # Errors
///
/// - `RelayError::SourceFailed` - Source could not be opened or broke off
/// - `RelayError::SinkFailed` - Sink rejected data or its consumer left
/// - `RelayError::Cancelled` - `cancel` fired
/// - `RelayError::DeadlineExceeded` - `options.max_duration` elapsed
pub async fn relay<S>(
    selected: &SelectedEncoding,
    opener: &dyn SourceOpener,
    mut sink: S,
    options: &RelayOptions,
    cancel: &CancellationToken,
) -> Result<RelayReport, RelayError>
where
    S: ByteSink,
{
    let started = Instant::now();
    let window = options.transfer_window.max(1);
    let deadline = options.max_duration.map(|d| started + d);
    let deadline_expired = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline_expired);

    let locator = &selected.descriptor().locator;
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        _ = &mut deadline_expired => Err(RelayError::DeadlineExceeded),
        _ = sink.closed() => Err(RelayError::SinkFailed("consumer left before the stream opened".to_string())),
        opened = opener.open(locator) => opened,
    };
    let mut source = match opened {
        Ok(source) => source,
        Err(e) => {
            warn!(error = %e, "Could not open media source");
            return Err(e);
        }
    };

    let content_type = selected.content_type();
    sink.declare_content_type(&content_type).await?;
    debug!(
        content_type = %content_type,
        content_length = ?source.content_length(),
        "Media source opened"
    );

    let mut bytes_written = 0u64;
    let mut chunks_read = 0u64;

    let outcome = async {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RelayError::Cancelled),
                _ = &mut deadline_expired => Err(RelayError::DeadlineExceeded),
                _ = sink.closed() => Err(RelayError::SinkFailed("consumer disconnected".to_string())),
                chunk = source.next_chunk() => chunk,
            };

            let Some(mut chunk) = next? else {
                return Ok::<(), RelayError>(());
            };
            chunks_read += 1;

            while !chunk.is_empty() {
                let piece: Bytes = chunk.split_to(chunk.len().min(window));
                let len = piece.len() as u64;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                    _ = &mut deadline_expired => return Err(RelayError::DeadlineExceeded),
                    written = sink.write_chunk(piece) => written?,
                }
                bytes_written += len;
            }
        }
    }
    .await;

    // Release the upstream connection before touching the sink again.
    drop(source);

    match outcome {
        Ok(()) => {
            sink.finish().await?;
            let report = RelayReport {
                content_type,
                bytes_written,
                chunks_read,
                elapsed: started.elapsed(),
            };
            info!(
                bytes = report.bytes_written,
                chunks = report.chunks_read,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Relay finished"
            );
            Ok(report)
        }
        Err(e) => {
            if !e.is_sink_side() {
                sink.abort(&e.to_string()).await;
            }
            warn!(error = %e, bytes = bytes_written, "Relay ended early");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryOpener, MemorySink, failing_opener};
    use crate::selection::select_highest;
    use crate::source::{EncodingDescriptor, Locator, Manifest};

    fn selected(container: &str) -> SelectedEncoding {
        let manifest = Manifest::new(
            "abc",
            vec![EncodingDescriptor::new(container, 720, Locator::new("mem://clip"))],
        )
        .unwrap();
        select_highest(&manifest)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_byte_exact_passthrough() {
        let data = payload(300_000);
        let opener = MemoryOpener::new(data.clone(), 10_000);
        let sink = MemorySink::new();
        let probe = sink.probe();

        let report = relay(
            &selected("mp4"),
            &opener,
            sink,
            &RelayOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.bytes_written, data.len() as u64);
        assert_eq!(report.content_type, "video/mp4");
        assert_eq!(probe.bytes(), data);
        assert_eq!(probe.content_type().as_deref(), Some("video/mp4"));
        assert!(probe.finished());
        assert!(opener.probe().released());
    }

    #[tokio::test]
    async fn test_large_chunks_are_split_to_window() {
        let data = payload(10_000);
        let opener = MemoryOpener::new(data.clone(), 10_000);
        let sink = MemorySink::new();
        let probe = sink.probe();
        let options = RelayOptions {
            transfer_window: 1024,
            max_duration: None,
        };

        relay(&selected("webm"), &opener, sink, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(probe.bytes(), data);
        assert!(probe.max_write() <= 1024);
        assert_eq!(probe.writes(), 10);
    }

    #[tokio::test]
    async fn test_content_type_declared_before_first_byte() {
        let opener = MemoryOpener::new(payload(100), 10);
        let sink = MemorySink::new();
        let probe = sink.probe();

        relay(
            &selected("webm"),
            &opener,
            sink,
            &RelayOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(probe.writes_before_declaration(), 0);
        assert_eq!(probe.content_type().as_deref(), Some("video/webm"));
    }

    #[tokio::test]
    async fn test_open_failure_writes_nothing() {
        let sink = MemorySink::new();
        let probe = sink.probe();

        let result = relay(
            &selected("mp4"),
            &failing_opener("connection refused"),
            sink,
            &RelayOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(
            result,
            Err(RelayError::SourceFailed("connection refused".to_string()))
        );
        assert!(probe.content_type().is_none());
        assert!(probe.bytes().is_empty());
    }

    #[tokio::test]
    async fn test_source_failure_mid_stream_aborts_sink() {
        let opener = MemoryOpener::new(payload(1000), 100).fail_after(3);
        let sink = MemorySink::new();
        let probe = sink.probe();

        let result = relay(
            &selected("mp4"),
            &opener,
            sink,
            &RelayOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(RelayError::SourceFailed(_))));
        assert_eq!(probe.bytes().len(), 300);
        assert!(probe.aborted());
        assert!(!probe.finished());
        assert!(opener.probe().released());
    }

    #[tokio::test]
    async fn test_sink_closure_stops_reading() {
        let total_chunks = 1000;
        let opener = MemoryOpener::new(payload(100 * total_chunks), 100);
        let sink = MemorySink::new().close_after_bytes(250);
        let probe = sink.probe();

        let result = relay(
            &selected("mp4"),
            &opener,
            sink,
            &RelayOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(RelayError::SinkFailed(_))));
        assert!(probe.bytes().len() <= 300);
        assert!(opener.probe().reads() <= 4);
        assert!(opener.probe().released());
        assert!(probe.released());
    }

    #[tokio::test]
    async fn test_cancellation_stops_relay() {
        let opener = MemoryOpener::new(payload(1000), 100).stall_after(2);
        let sink = MemorySink::new();
        let probe = sink.probe();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = relay(&selected("mp4"), &opener, sink, &RelayOptions::default(), &cancel).await;

        assert_eq!(result, Err(RelayError::Cancelled));
        assert_eq!(probe.bytes().len(), 200);
        assert!(probe.aborted());
        assert!(opener.probe().released());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_stalled_stream() {
        let opener = MemoryOpener::new(payload(1000), 100).stall_after(1);
        let sink = MemorySink::new();
        let options = RelayOptions {
            transfer_window: 64 * 1024,
            max_duration: Some(Duration::from_secs(5)),
        };

        let result = relay(&selected("mp4"), &opener, sink, &options, &CancellationToken::new()).await;
        assert_eq!(result, Err(RelayError::DeadlineExceeded));
    }
}
