//! Video sources: URL validation, encoding manifests and their resolution.
//!
//! Validation is pure and runs before any network access. Resolution is
//! the only step here that talks to the source, and it does so through the
//! [`ManifestResolver`] trait so the pipeline can be driven by mocks.

pub mod manifest;
pub mod resolver;
pub mod validator;

pub use manifest::{EncodingDescriptor, Locator, Manifest};
pub use resolver::{
    ManifestResolver, PlayerApiResolver, ResolutionError, manifest_from_player_response,
};
pub use validator::{SourceKind, UrlValidator, ValidationError, VideoUrl};
