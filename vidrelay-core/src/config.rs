//! Centralized configuration for vidrelay.
//!
//! All tunable parameters and endpoints are defined here so the rest of
//! the code never embeds hosts, credentials or limits.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::selection::SelectionPolicy;

/// User agent sent to every upstream.
pub const USER_AGENT: &str = concat!("vidrelay/", env!("CARGO_PKG_VERSION"));

/// Errors raised when configuration values are unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable held a value that does not parse.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },

    /// A field is outside its allowed range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

/// Central configuration for all vidrelay components.
///
/// Groups related settings into sections. Supports environment variable
/// overrides for deployment.
#[derive(Debug, Clone, Default)]
pub struct VidrelayConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub resolver: ResolverConfig,
    pub relay: RelayConfig,
    pub forwarder: ForwarderConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: IpAddr,
    /// Port to bind.
    pub port: u16,
    /// Directory served as a static UI shell, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Socket address to listen on.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Which video hosts the validator accepts beyond the YouTube family.
///
/// Every accepted host resolves through the same player endpoint
/// ([`ResolverConfig::player_endpoint`]), so an extra host only makes sense
/// for a mirror whose ids that endpoint knows.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    /// Extra hosts validated with the generic id rules. Their ids are sent
    /// to the player endpoint unchanged.
    pub extra_hosts: Vec<String>,
}

/// Player endpoint settings for manifest resolution.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// URL the player request is POSTed to.
    pub player_endpoint: String,
    /// Client name announced in the player request.
    pub client_name: String,
    /// Client version announced in the player request.
    pub client_version: String,
    /// HTTP user agent.
    pub user_agent: String,
    /// Timeout for the whole resolution round trip.
    pub request_timeout: Duration,
    /// Also offer video-only and audio-only renditions.
    pub include_adaptive: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            player_endpoint: "https://www.youtube.com/youtubei/v1/player".to_string(),
            client_name: "ANDROID_VR".to_string(),
            client_version: "1.71.26".to_string(),
            user_agent: USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(15),
            include_adaptive: false,
        }
    }
}

/// Byte relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Largest chunk written to a sink at once.
    pub transfer_window: usize,
    /// Chunks buffered between the relay task and the response body.
    pub channel_capacity: usize,
    /// Connect timeout for media sources.
    pub connect_timeout: Duration,
    /// Upper bound on a single stream (None = unbounded).
    pub max_stream_duration: Option<Duration>,
    /// HTTP user agent for media requests.
    pub user_agent: String,
    /// Policy used to pick an encoding.
    pub selection_policy: SelectionPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transfer_window: 64 * 1024, // 64 KiB
            channel_capacity: 4,
            connect_timeout: Duration::from_secs(10),
            max_stream_duration: None,
            user_agent: USER_AGENT.to_string(),
            selection_policy: SelectionPolicy::Highest,
        }
    }
}

/// Remote extraction API settings for the proxy path.
#[derive(Clone)]
pub struct ForwarderConfig {
    /// Endpoint the proxy request is POSTed to.
    pub endpoint: String,
    /// Account id forwarded as `userId`.
    pub user_id: String,
    /// Account key forwarded as `secretKey`.
    pub secret_key: String,
    /// Timeout for the whole forward round trip.
    pub request_timeout: Duration,
    /// Return upstream error text to clients instead of a generic message.
    pub expose_upstream_errors: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://h.aaaapp.cn/single_post".to_string(),
            user_id: String::new(),
            secret_key: String::new(),
            request_timeout: Duration::from_secs(30),
            expose_upstream_errors: true,
        }
    }
}

impl ForwarderConfig {
    /// True when both credential fields are set.
    pub fn has_credentials(&self) -> bool {
        !self.user_id.is_empty() && !self.secret_key.is_empty()
    }
}

// Credentials stay out of Debug output.
impl fmt::Debug for ForwarderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwarderConfig")
            .field("endpoint", &self.endpoint)
            .field("user_id", &redacted(&self.user_id))
            .field("secret_key", &redacted(&self.secret_key))
            .field("request_timeout", &self.request_timeout)
            .field("expose_upstream_errors", &self.expose_upstream_errors)
            .finish()
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() { "<unset>" } else { "<redacted>" }
}

impl VidrelayConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidValue` - A variable does not parse
    /// - `ConfigError::Invalid` - The resulting configuration is unusable
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidValue` - A variable does not parse
    /// - `ConfigError::Invalid` - The resulting configuration is unusable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("VIDRELAY_HOST") {
            config.server.host = parse_value("VIDRELAY_HOST", &host)?;
        }
        if let Some(port) = get("VIDRELAY_PORT") {
            config.server.port = parse_value("VIDRELAY_PORT", &port)?;
        }
        if let Some(dir) = get("VIDRELAY_STATIC_DIR") {
            config.server.static_dir = Some(PathBuf::from(dir));
        }

        if let Some(hosts) = get("VIDRELAY_EXTRA_HOSTS") {
            config.source.extra_hosts = hosts
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
        }

        if let Some(endpoint) = get("VIDRELAY_PLAYER_ENDPOINT") {
            config.resolver.player_endpoint = endpoint;
        }
        if let Some(secs) = get("VIDRELAY_RESOLVE_TIMEOUT") {
            config.resolver.request_timeout =
                Duration::from_secs(parse_value("VIDRELAY_RESOLVE_TIMEOUT", &secs)?);
        }
        if let Some(flag) = get("VIDRELAY_INCLUDE_ADAPTIVE") {
            config.resolver.include_adaptive = parse_flag("VIDRELAY_INCLUDE_ADAPTIVE", &flag)?;
        }

        if let Some(window) = get("VIDRELAY_TRANSFER_WINDOW") {
            config.relay.transfer_window = parse_value("VIDRELAY_TRANSFER_WINDOW", &window)?;
        }
        if let Some(secs) = get("VIDRELAY_MAX_STREAM_SECS") {
            let secs: u64 = parse_value("VIDRELAY_MAX_STREAM_SECS", &secs)?;
            config.relay.max_stream_duration = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(policy) = get("VIDRELAY_SELECTION_POLICY") {
            config.relay.selection_policy =
                policy.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "VIDRELAY_SELECTION_POLICY".to_string(),
                    value: policy.clone(),
                })?;
        }

        if let Some(endpoint) = get("VIDRELAY_PROXY_ENDPOINT") {
            config.forwarder.endpoint = endpoint;
        }
        if let Some(user_id) = get("VIDRELAY_PROXY_USER_ID") {
            config.forwarder.user_id = user_id;
        }
        if let Some(secret_key) = get("VIDRELAY_PROXY_SECRET_KEY") {
            config.forwarder.secret_key = secret_key;
        }
        if let Some(flag) = get("VIDRELAY_EXPOSE_UPSTREAM_ERRORS") {
            config.forwarder.expose_upstream_errors =
                parse_flag("VIDRELAY_EXPOSE_UPSTREAM_ERRORS", &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Invalid` - A limit is zero or an endpoint is not a URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.transfer_window == 0 {
            return Err(invalid("relay.transfer_window must be greater than zero"));
        }
        if self.relay.channel_capacity == 0 {
            return Err(invalid("relay.channel_capacity must be greater than zero"));
        }
        for (name, endpoint) in [
            ("resolver.player_endpoint", &self.resolver.player_endpoint),
            ("forwarder.endpoint", &self.forwarder.endpoint),
        ] {
            match Url::parse(endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => return Err(invalid(&format!("{name} is not an http(s) URL: {endpoint}"))),
            }
        }
        Ok(())
    }

    /// Creates a configuration suited to tests: short timeouts, local
    /// endpoints, and `video.example` accepted as a source host.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.server.port = 0;
        config.source.extra_hosts = vec!["video.example".to_string()];
        config.resolver.player_endpoint = "http://127.0.0.1:9/player".to_string();
        config.resolver.request_timeout = Duration::from_secs(2);
        config.relay.connect_timeout = Duration::from_secs(2);
        config.relay.max_stream_duration = Some(Duration::from_secs(10));
        config.forwarder.endpoint = "http://127.0.0.1:9/single_post".to_string();
        config.forwarder.user_id = "test-user".to_string();
        config.forwarder.secret_key = "test-secret".to_string();
        config.forwarder.request_timeout = Duration::from_secs(2);
        config
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_values() {
        let config = VidrelayConfig::default();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.relay.transfer_window, 65536);
        assert_eq!(config.relay.max_stream_duration, None);
        assert_eq!(config.relay.selection_policy, SelectionPolicy::Highest);
        assert!(!config.resolver.include_adaptive);
        assert!(config.forwarder.expose_upstream_errors);
        assert!(!config.forwarder.has_credentials());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides() {
        let config = VidrelayConfig::from_lookup(lookup(&[
            ("VIDRELAY_PORT", "8080"),
            ("VIDRELAY_HOST", "0.0.0.0"),
            ("VIDRELAY_EXTRA_HOSTS", "Video.Example, mirror.example,"),
            ("VIDRELAY_MAX_STREAM_SECS", "600"),
            ("VIDRELAY_SELECTION_POLICY", "prefer:webm"),
            ("VIDRELAY_PROXY_USER_ID", "user"),
            ("VIDRELAY_PROXY_SECRET_KEY", "key"),
            ("VIDRELAY_EXPOSE_UPSTREAM_ERRORS", "false"),
            ("VIDRELAY_INCLUDE_ADAPTIVE", "yes"),
        ]))
        .unwrap();

        assert_eq!(config.server.bind_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.source.extra_hosts, vec!["video.example", "mirror.example"]);
        assert_eq!(config.relay.max_stream_duration, Some(Duration::from_secs(600)));
        assert_eq!(
            config.relay.selection_policy,
            SelectionPolicy::Prefer("webm".to_string())
        );
        assert!(config.forwarder.has_credentials());
        assert!(!config.forwarder.expose_upstream_errors);
        assert!(config.resolver.include_adaptive);
    }

    #[test]
    fn test_zero_stream_limit_means_unbounded() {
        let config =
            VidrelayConfig::from_lookup(lookup(&[("VIDRELAY_MAX_STREAM_SECS", "0")])).unwrap();
        assert_eq!(config.relay.max_stream_duration, None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            VidrelayConfig::from_lookup(lookup(&[("VIDRELAY_PORT", "http")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            VidrelayConfig::from_lookup(lookup(&[("VIDRELAY_EXPOSE_UPSTREAM_ERRORS", "maybe")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            VidrelayConfig::from_lookup(lookup(&[("VIDRELAY_TRANSFER_WINDOW", "0")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            VidrelayConfig::from_lookup(lookup(&[("VIDRELAY_PROXY_ENDPOINT", "ftp://x")])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let mut config = ForwarderConfig::default();
        config.secret_key = "super-secret".to_string();
        let shown = format!("{config:?}");
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_testing_preset_is_valid() {
        assert!(VidrelayConfig::for_testing().validate().is_ok());
    }
}
