//! Relay configuration with validation.

use crate::domain::role::{CacheKeyMode, Role};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default wait for a worker reply.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default cache entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default concurrent handlers per worker subscription.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Application name, first part of the deployment identity
    pub app_name: String,
    /// Role this process runs
    pub role: Role,
    /// HTTP bind address
    pub host: IpAddr,
    /// HTTP port (0 picks a free port)
    pub port: u16,
    /// Build version reported by `/version`
    pub version: String,
    /// Result cache policy
    pub cache: CacheConfig,
    /// How long the api role waits for a reply
    pub wait_timeout: Duration,
    /// Concurrent handlers per worker subscription
    pub max_in_flight: usize,
    /// Drop redelivered `(token, reply_to)` pairs seen within this window
    pub dedup_window: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_name: "k8sdiy".to_string(),
            role: Role::Api,
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            version: crate::VERSION.to_string(),
            cache: CacheConfig::default(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            dedup_window: None,
        }
    }
}

impl GatewayConfig {
    /// Default configuration for `role`.
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.is_empty() {
            return Err(ConfigError::InvalidAppName(
                "application name cannot be empty".into(),
            ));
        }
        if self
            .app_name
            .chars()
            .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace())
        {
            return Err(ConfigError::InvalidAppName(format!(
                "'{}' cannot contain '.', '*', '>' or whitespace",
                self.app_name
            )));
        }

        if self.wait_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "wait timeout cannot be 0".into(),
            ));
        }

        if self.max_in_flight == 0 || self.max_in_flight > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidLimit(format!(
                "max_in_flight must be between 1 and {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }

        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(ConfigError::InvalidTimeout("cache ttl cannot be 0".into()));
        }

        if self.role == Role::Data && self.cache.key_mode == Some(CacheKeyMode::Digest) {
            return Err(ConfigError::InvalidCacheKey(
                "data records are cached per token; digest keys would mix tokens".into(),
            ));
        }

        if matches!(self.dedup_window, Some(w) if w.is_zero()) {
            return Err(ConfigError::InvalidTimeout(
                "dedup window cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// HTTP bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Deployment identity: `<app_name>-<role>:<version>`
    pub fn environment(&self) -> String {
        format!("{}-{}:{}", self.app_name, self.role, self.version)
    }

    /// Subject a worker announces itself on: `api.<environment>`
    pub fn discovery_subject(&self) -> String {
        format!("api.{}", self.environment())
    }

    /// Reply inbox prefix for one api node: `_INBOX.<app_name>.<node_id>`
    pub fn inbox_prefix(&self, node_id: &str) -> String {
        format!("_INBOX.{}.{}", self.app_name, node_id)
    }

    /// Effective cache key derivation for this role.
    pub fn cache_key_mode(&self) -> CacheKeyMode {
        self.cache
            .key_mode
            .unwrap_or_else(|| self.role.default_key_mode())
    }

    /// Bus connection name: `<role> on <role>.*`
    pub fn connection_name(&self) -> String {
        format!("{} on {}", self.role, self.role.subject())
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every request is computed directly
    pub enabled: bool,
    /// Entry lifetime
    pub ttl: Duration,
    /// Key derivation override; the role default applies when unset
    pub key_mode: Option<CacheKeyMode>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
            key_mode: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid application name: {0}")]
    InvalidAppName(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("invalid cache key mode: {0}")]
    InvalidCacheKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 8080);
        assert_eq!(config.wait_timeout, Duration::from_secs(2));
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_derived_names() {
        let mut config = GatewayConfig::for_role(Role::Ascii);
        config.version = "0.1.0".into();

        assert_eq!(config.environment(), "k8sdiy-ascii:0.1.0");
        assert_eq!(config.discovery_subject(), "api.k8sdiy-ascii:0.1.0");
        assert_eq!(config.inbox_prefix("n1"), "_INBOX.k8sdiy.n1");
        assert_eq!(config.connection_name(), "ascii on ascii.*");
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.app_name = "a.b".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAppName(_))
        ));

        let mut config = GatewayConfig::default();
        config.wait_timeout = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));

        let mut config = GatewayConfig::default();
        config.max_in_flight = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));

        let mut config = GatewayConfig::default();
        config.dedup_window = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_key_mode_override() {
        let mut config = GatewayConfig::for_role(Role::Ascii);
        assert_eq!(config.cache_key_mode(), CacheKeyMode::Digest);

        config.cache.key_mode = Some(CacheKeyMode::Token);
        assert_eq!(config.cache_key_mode(), CacheKeyMode::Token);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_data_rejects_digest_keys() {
        let mut config = GatewayConfig::for_role(Role::Data);
        assert_eq!(config.cache_key_mode(), CacheKeyMode::Token);

        config.cache.key_mode = Some(CacheKeyMode::Digest);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCacheKey(_))
        ));

        config.cache.key_mode = Some(CacheKeyMode::Token);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_defaults() {
        let config: GatewayConfig = serde_json::from_str(r#"{"role": "img"}"#).unwrap();
        assert_eq!(config.role, Role::Img);
        assert_eq!(config.app_name, "k8sdiy");
    }
}
