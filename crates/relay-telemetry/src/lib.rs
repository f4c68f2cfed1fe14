//! # Relay Telemetry
//!
//! Logging bootstrap shared by every relay role.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env().with_timestamps(cli.timestamp);
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` / `RELAY_LOG_LEVEL` | `info` | Log level filter |
//! | `RELAY_JSON_LOGS` | `false` (`true` in containers) | JSON formatted output |
//! | `RELAY_SHOW_TIMESTAMPS` | `false` | Prefix lines with a timestamp |
//! | `RELAY_SERVICE_NAME` | `relay` | Service name attached to the startup line |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("Failed to install global subscriber: {0}")]
    Install(String),
}

/// Span carrying the role name, entered by long-running role tasks.
///
/// ```rust,ignore
/// let _span = relay_telemetry::role_span!("worker", role = "ascii").entered();
/// ```
#[macro_export]
macro_rules! role_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
