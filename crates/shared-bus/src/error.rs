//! Bus error types.

use thiserror::Error;

/// Errors from bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus was drained or the connection closed.
    #[error("message bus closed")]
    Closed,

    /// Subject failed validation.
    #[error("invalid subject '{subject}': {reason}")]
    InvalidSubject { subject: String, reason: String },

    /// The transport rejected a publish.
    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },

    /// The transport rejected a subscription.
    #[error("subscribe to '{subject}' failed: {reason}")]
    Subscribe { subject: String, reason: String },

    /// Could not connect to the broker.
    #[error("bus connection failed: {0}")]
    Connect(String),

    /// Flushing outbound messages failed.
    #[error("flush failed: {0}")]
    Flush(String),
}

impl BusError {
    pub(crate) fn invalid(subject: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSubject {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }
}
