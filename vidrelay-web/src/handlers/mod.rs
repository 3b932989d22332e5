//! HTTP request handlers organized by functionality

pub mod download;
pub mod health;
pub mod proxy;

use serde::Deserialize;

// Re-export handler functions
pub use download::api_download;
pub use health::api_health;
pub use proxy::api_proxy;

/// Request body shared by the proxy and download endpoints.
#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: Option<String>,
}
