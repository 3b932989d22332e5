//! Proxy forwarding to the remote extraction API.
//!
//! The forwarder adds the configured credentials to a client URL, posts the
//! result to the remote endpoint and hands back its JSON untouched.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ForwarderConfig;

/// Errors raised by the proxy forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    /// Transport failure, non-success status or non-JSON body. Carries the
    /// underlying error text.
    #[error("{0}")]
    UpstreamFailed(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyRequest<'a> {
    user_id: &'a str,
    secret_key: &'a str,
    url: &'a str,
}

/// Forwards URLs to the remote extraction API.
#[derive(Clone)]
pub struct ProxyForwarder {
    client: Client,
    config: ForwarderConfig,
}

impl ProxyForwarder {
    /// Creates a forwarder with its own connection pool.
    ///
    /// # Errors
    ///
    /// - `ForwardError::UpstreamFailed` - The HTTP client could not be built
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ForwardError::UpstreamFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Configuration this forwarder was built with.
    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Posts `client_url` with the configured credentials and returns the
    /// remote JSON body unmodified.
    ///
    /// The URL is not validated here; the remote API decides what it
    /// accepts.
    ///
    /// # Errors
    ///
    /// - `ForwardError::UpstreamFailed` - Transport failure, non-success
    ///   status or a body that is not JSON
    pub async fn forward(&self, client_url: &str) -> Result<Value, ForwardError> {
        let payload = ProxyRequest {
            user_id: &self.config.user_id,
            secret_key: &self.config.secret_key,
            url: client_url,
        };

        debug!(endpoint = %self.config.endpoint, "Forwarding proxy request");

        let result = async {
            let response = self
                .client
                .post(&self.config.endpoint)
                .json(&payload)
                .send()
                .await?
                .error_for_status()?;
            response.json::<Value>().await
        }
        .await;

        result.map_err(|e| {
            let message = e.without_url().to_string();
            warn!(error = %message, "Proxy upstream failed");
            ForwardError::UpstreamFailed(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/single_post")
    }

    fn config(endpoint: String) -> ForwarderConfig {
        ForwarderConfig {
            endpoint,
            user_id: "user-1".to_string(),
            secret_key: "key-1".to_string(),
            request_timeout: Duration::from_secs(2),
            expose_upstream_errors: true,
        }
    }

    #[tokio::test]
    async fn test_forward_sends_credentials_and_returns_body() {
        let seen = Arc::new(Mutex::new(None::<Value>));
        let app = Router::new()
            .route(
                "/single_post",
                post(
                    |State(seen): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
                        *seen.lock().unwrap() = Some(body);
                        Json(json!({"code": 200, "data": {"medias": [{"resource_url": "x"}]}}))
                    },
                ),
            )
            .with_state(seen.clone());
        let endpoint = serve(app).await;

        let forwarder = ProxyForwarder::new(config(endpoint)).unwrap();
        let body = forwarder
            .forward("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap();

        assert_eq!(body["data"]["medias"][0]["resource_url"], "x");
        let sent = seen.lock().unwrap().clone().unwrap();
        assert_eq!(
            sent,
            json!({
                "userId": "user-1",
                "secretKey": "key-1",
                "url": "https://youtu.be/dQw4w9WgXcQ"
            })
        );
    }

    #[tokio::test]
    async fn test_upstream_error_status_is_reported() {
        let app = Router::new().route(
            "/single_post",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let endpoint = serve(app).await;

        let forwarder = ProxyForwarder::new(config(endpoint)).unwrap();
        let ForwardError::UpstreamFailed(message) =
            forwarder.forward("https://youtu.be/x").await.unwrap_err();
        assert!(message.contains("503"), "unexpected message: {message}");
    }

    #[tokio::test]
    async fn test_non_json_body_is_an_error() {
        let app = Router::new().route("/single_post", post(|| async { "<html>oops</html>" }));
        let endpoint = serve(app).await;

        let forwarder = ProxyForwarder::new(config(endpoint)).unwrap();
        assert!(forwarder.forward("https://youtu.be/x").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = ProxyForwarder::new(config(format!("http://{addr}/single_post"))).unwrap();
        assert!(matches!(
            forwarder.forward("https://youtu.be/x").await,
            Err(ForwardError::UpstreamFailed(_))
        ));
    }
}
