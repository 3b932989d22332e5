//! vidrelay web - JSON API server

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! Exposes the proxy forwarder and the download pipeline over HTTP.

pub mod error;
pub mod handlers;
pub mod server;

// Re-export main types
pub use error::ApiError;
pub use server::{AppState, ServerError, build_router, run_server, serve};
