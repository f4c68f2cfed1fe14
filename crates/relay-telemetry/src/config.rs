//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name reported at startup
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error or an EnvFilter directive)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether log lines carry a timestamp
    pub show_timestamps: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "relay".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            show_timestamps: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `RELAY_SERVICE_NAME`: Service name (default: relay)
    /// - `RELAY_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `RELAY_JSON_LOGS`: JSON logs (default: false in dev, true in containers)
    /// - `RELAY_SHOW_TIMESTAMPS`: Timestamps (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("RELAY_SERVICE_NAME").unwrap_or_else(|_| "relay".to_string()),

            log_level: env::var("RELAY_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("RELAY_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            show_timestamps: env::var("RELAY_SHOW_TIMESTAMPS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }

    /// Override the service name, typically `<name>-<role>`.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Turn timestamps on when the command line asks for them.
    #[must_use]
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.show_timestamps |= enabled;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "relay");
        assert_eq!(config.log_level, "info");
        assert!(!config.show_timestamps);
    }

    #[test]
    fn test_overrides() {
        let config = TelemetryConfig::default()
            .with_service_name("k8sdiy-api")
            .with_timestamps(true);
        assert_eq!(config.service_name, "k8sdiy-api");
        assert!(config.show_timestamps);

        // a false command-line flag never switches off an env-enabled toggle
        let config = config.with_timestamps(false);
        assert!(config.show_timestamps);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }
}
