//! Relay error types.
//!
//! Three layers, matching how far a failure may travel:
//!
//! - [`GatewayError`]: startup. Fatal for the process.
//! - [`RequestError`]: one HTTP call. Mapped to a status code, never fatal.
//! - [`ComputeError`], [`CacheError`], [`StoreError`]: port failures. Cache and
//!   store failures degrade a feature; compute failures become error replies.

use crate::domain::envelope::{EnvelopeError, Token};
use serde::Serialize;
use shared_bus::BusError;
use std::time::Duration;

/// Gateway-level errors (startup)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP listener bind error
    #[error("server bind error on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Bus connection or subscription error
    #[error("message bus error: {0}")]
    Bus(#[from] BusError),
}

/// Per-request failures surfaced to the single affected caller.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Publishing the request failed; the caller did not wait.
    #[error("publish failed: {0}")]
    Publish(#[from] BusError),

    /// No reply within the wait timeout.
    #[error("no reply for token {token} within {}ms", .waited.as_millis())]
    Timeout { token: Token, waited: Duration },

    /// Local computation failed (worker HTTP surface).
    #[error("computation failed: {0}")]
    Compute(#[from] ComputeError),

    /// The node is draining and accepts no new work.
    #[error("node is draining")]
    Draining,

    /// A client-supplied token is already in flight.
    #[error("token {0} is already pending")]
    DuplicateToken(Token),

    /// Malformed query, body, target or command.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The worker answered with an error reply.
    #[error("worker error: {0}")]
    Remote(String),
}

impl RequestError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Publish(_) | Self::Draining => 503,
            Self::Timeout { .. } => 504,
            Self::Compute(ComputeError::NotFound(_)) => 404,
            Self::Compute(ComputeError::InvalidInput(_)) => 400,
            Self::Compute(_) | Self::Remote(_) => 502,
            Self::DuplicateToken(_) => 409,
            Self::BadRequest(_) => 400,
        }
    }

    /// Short machine-readable kind for the JSON error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Publish(_) => "publish_failed",
            Self::Timeout { .. } => "timeout",
            Self::Compute(_) => "compute_failed",
            Self::Draining => "draining",
            Self::DuplicateToken(_) => "duplicate_token",
            Self::BadRequest(_) => "bad_request",
            Self::Remote(_) => "remote_error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<EnvelopeError> for RequestError {
    fn from(e: EnvelopeError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

/// JSON error body returned by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Role computation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no record for token {0}")]
    NotFound(Token),

    #[error("{0} unavailable")]
    Unavailable(&'static str),

    #[error("store failure: {0}")]
    Store(String),
}

impl From<StoreError> for ComputeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

/// Cache failures. Always treated as a miss by callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache unreachable: {0}")]
    Unreachable(String),

    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// Durable store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store open failed: {0}")]
    Open(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("store worker failed: {0}")]
    Join(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Query(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let timeout = RequestError::Timeout {
            token: Token::new(1),
            waited: Duration::from_secs(2),
        };
        assert_eq!(timeout.status_code(), 504);
        assert_eq!(RequestError::Publish(BusError::Closed).status_code(), 503);
        assert_eq!(RequestError::Draining.status_code(), 503);
        assert_eq!(RequestError::Remote("x".into()).status_code(), 502);
        assert_eq!(
            RequestError::DuplicateToken(Token::new(3)).status_code(),
            409
        );
        assert_eq!(RequestError::BadRequest("x".into()).status_code(), 400);
    }

    #[test]
    fn test_compute_status_codes() {
        let not_found = RequestError::Compute(ComputeError::NotFound(Token::new(5)));
        assert_eq!(not_found.status_code(), 404);
        let invalid = RequestError::Compute(ComputeError::InvalidInput("x".into()));
        assert_eq!(invalid.status_code(), 400);
        let store = RequestError::Compute(ComputeError::Unavailable("durable store"));
        assert_eq!(store.status_code(), 502);
    }

    #[test]
    fn test_error_body() {
        let body = RequestError::DuplicateToken(Token::new(42)).body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "duplicate_token");
        assert!(json["message"].as_str().unwrap().contains("42"));
    }

    #[test]
    fn test_timeout_message() {
        let err = RequestError::Timeout {
            token: Token::new(7),
            waited: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "no reply for token 7 within 1500ms");
    }
}
