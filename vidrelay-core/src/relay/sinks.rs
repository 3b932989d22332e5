//! Sink implementations: a bounded channel feeding an HTTP body, and any
//! `AsyncWrite` (files, stdout).

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::relay::traits::{ByteSink, SinkError};

/// How long an abort waits for room in the channel before giving up.
const ABORT_GRACE: Duration = Duration::from_secs(5);

/// Item type of the body channel.
pub type BodyChunk = Result<Bytes, io::Error>;

/// Sink writing into a bounded channel that a response body drains.
///
/// The content type travels on a separate one-shot channel so the
/// response headers can be built as soon as the relay declares it. When
/// the receiving side is dropped (client disconnected) writes fail and
/// [`ByteSink::closed`] resolves.
pub struct ChannelSink {
    content_type: Option<oneshot::Sender<String>>,
    tx: mpsc::Sender<BodyChunk>,
}

/// Receiving half of a [`ChannelSink`].
pub struct ChannelReceiver {
    /// Resolves with the declared content type; errors if the relay ended
    /// before declaring one.
    pub content_type: oneshot::Receiver<String>,
    /// Body chunks in relay order. An `Err` item marks a truncated stream.
    pub body: mpsc::Receiver<BodyChunk>,
}

/// Creates a channel sink buffering at most `capacity` chunks.
pub fn channel_sink(capacity: usize) -> (ChannelSink, ChannelReceiver) {
    let (type_tx, type_rx) = oneshot::channel();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSink {
            content_type: Some(type_tx),
            tx,
        },
        ChannelReceiver {
            content_type: type_rx,
            body: rx,
        },
    )
}

#[async_trait::async_trait]
impl ByteSink for ChannelSink {
    async fn declare_content_type(&mut self, content_type: &str) -> Result<(), SinkError> {
        let sender = self
            .content_type
            .take()
            .ok_or_else(|| SinkError::new("content type already declared"))?;
        sender
            .send(content_type.to_string())
            .map_err(|_| SinkError::new("response was dropped before headers were sent"))
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| SinkError::new("client disconnected"))
    }

    async fn closed(&mut self) {
        self.tx.closed().await
    }

    async fn abort(&mut self, reason: &str) {
        let error = io::Error::other(reason.to_string());
        if tokio::time::timeout(ABORT_GRACE, self.tx.send(Err(error)))
            .await
            .is_err()
        {
            debug!("Body channel stayed full; dropping truncation marker");
        }
    }
}

/// Sink writing into any async writer.
///
/// The declared content type is only recorded; files and pipes have no
/// header to carry it.
pub struct WriterSink<W> {
    writer: W,
    content_type: Option<String>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            content_type: None,
        }
    }

    /// Content type declared by the relay, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

#[async_trait::async_trait]
impl<W> ByteSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn declare_content_type(&mut self, content_type: &str) -> Result<(), SinkError> {
        self.content_type = Some(content_type.to_string());
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.writer.write_all(&chunk).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn abort(&mut self, _reason: &str) {
        let _ = self.writer.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_type_then_chunks() {
        let (mut sink, mut rx) = channel_sink(4);

        sink.declare_content_type("video/mp4").await.unwrap();
        sink.write_chunk(Bytes::from_static(b"abc")).await.unwrap();
        sink.write_chunk(Bytes::from_static(b"def")).await.unwrap();
        drop(sink);

        assert_eq!(rx.content_type.await.unwrap(), "video/mp4");
        assert_eq!(rx.body.recv().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(rx.body.recv().await.unwrap().unwrap(), Bytes::from_static(b"def"));
        assert!(rx.body.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_rejects_second_declaration() {
        let (mut sink, _rx) = channel_sink(1);
        sink.declare_content_type("video/mp4").await.unwrap();
        assert!(sink.declare_content_type("video/webm").await.is_err());
    }

    #[tokio::test]
    async fn test_channel_sink_detects_dropped_receiver() {
        let (mut sink, rx) = channel_sink(1);
        drop(rx);

        assert!(sink.write_chunk(Bytes::from_static(b"x")).await.is_err());
        tokio::time::timeout(Duration::from_secs(1), sink.closed())
            .await
            .expect("closed should resolve once the receiver is gone");
    }

    #[tokio::test]
    async fn test_abort_marks_truncation() {
        let (mut sink, mut rx) = channel_sink(2);
        sink.declare_content_type("video/mp4").await.unwrap();
        sink.write_chunk(Bytes::from_static(b"partial")).await.unwrap();
        sink.abort("upstream reset").await;
        drop(sink);

        assert!(rx.body.recv().await.unwrap().is_ok());
        let marker = rx.body.recv().await.unwrap();
        assert_eq!(marker.unwrap_err().to_string(), "upstream reset");
    }

    #[tokio::test]
    async fn test_writer_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let file = tokio::fs::File::create(&path).await.unwrap();

        let mut sink = WriterSink::new(file);
        sink.declare_content_type("video/mp4").await.unwrap();
        sink.write_chunk(Bytes::from_static(b"hello ")).await.unwrap();
        sink.write_chunk(Bytes::from_static(b"world")).await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(sink.content_type(), Some("video/mp4"));

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_writer_sink_writes_chunks_in_order() {
        let writer = tokio_test::io::Builder::new()
            .write(b"first")
            .write(b"second")
            .build();

        let mut sink = WriterSink::new(writer);
        sink.write_chunk(Bytes::from_static(b"first")).await.unwrap();
        sink.write_chunk(Bytes::from_static(b"second")).await.unwrap();
        sink.finish().await.unwrap();
    }
}
