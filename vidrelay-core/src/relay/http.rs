//! HTTP byte sources backed by reqwest.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tracing::debug;

use crate::config::RelayConfig;
use crate::relay::traits::{ByteSource, RelayError, SourceOpener};
use crate::source::Locator;

type ChunkStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Opens direct media URLs with a GET request.
///
/// The client has a connect timeout but no overall timeout: a video may
/// legitimately stream for hours, and the relay's own deadline covers the
/// total duration.
#[derive(Clone)]
pub struct HttpSourceOpener {
    client: Client,
}

impl HttpSourceOpener {
    /// Builds an opener from the relay configuration.
    ///
    /// # Errors
    ///
    /// - `RelayError::SourceFailed` - The HTTP client could not be built
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RelayError::SourceFailed(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl SourceOpener for HttpSourceOpener {
    async fn open(&self, locator: &Locator) -> Result<Box<dyn ByteSource>, RelayError> {
        let response = self
            .client
            .get(locator.as_str())
            .send()
            .await
            .map_err(|e| RelayError::SourceFailed(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::SourceFailed(format!(
                "media server answered {status}"
            )));
        }

        let content_length = response.content_length();
        debug!(%status, ?content_length, "Media response received");

        Ok(Box::new(HttpByteSource {
            stream: Box::pin(response.bytes_stream()),
            content_length,
        }))
    }
}

/// Body of an in-flight media response.
pub struct HttpByteSource {
    stream: ChunkStream,
    content_length: Option<u64>,
}

#[async_trait::async_trait]
impl ByteSource for HttpByteSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RelayError> {
        self.stream
            .next()
            .await
            .transpose()
            .map_err(|e| RelayError::SourceFailed(e.without_url().to_string()))
    }

    fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_streams_response_body() {
        let body: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
        let expected = body.clone();
        let base = serve(Router::new().route("/clip", get(move || async move { body.clone() }))).await;

        let opener = HttpSourceOpener::new(&RelayConfig::default()).unwrap();
        let mut source = opener
            .open(&Locator::new(format!("{base}/clip")))
            .await
            .unwrap();
        assert_eq!(source.content_length(), Some(expected.len() as u64));

        let mut received = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_error_status_fails_open() {
        let base = serve(Router::new().route("/gone", get(|| async { StatusCode::FORBIDDEN }))).await;

        let opener = HttpSourceOpener::new(&RelayConfig::default()).unwrap();
        let result = opener.open(&Locator::new(format!("{base}/gone"))).await;
        match result {
            Err(RelayError::SourceFailed(msg)) => assert!(msg.contains("403")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected open to fail"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_fails_open() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let opener = HttpSourceOpener::new(&RelayConfig::default()).unwrap();
        let result = opener.open(&Locator::new(format!("http://{addr}/clip"))).await;
        assert!(matches!(result, Err(RelayError::SourceFailed(_))));
    }
}
