//! Publish side of the bus reply protocol (api role).

use crate::domain::envelope::{Envelope, Token, TokenGenerator};
use crate::domain::error::RequestError;
use crate::domain::pending::PendingRequestStore;
use crate::domain::role::Role;
use crate::drain::DrainController;
use crate::monitor::RelayMetrics;
use shared_bus::MessageBus;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Sends envelopes to worker roles and waits for the correlated reply.
pub struct BusRequester {
    bus: Arc<dyn MessageBus>,
    pending: Arc<PendingRequestStore>,
    tokens: TokenGenerator,
    inbox_prefix: String,
    wait: Duration,
    drain: DrainController,
    metrics: Arc<RelayMetrics>,
}

impl BusRequester {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        pending: Arc<PendingRequestStore>,
        inbox_prefix: impl Into<String>,
        wait: Duration,
        drain: DrainController,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            bus,
            pending,
            tokens: TokenGenerator::new(),
            inbox_prefix: inbox_prefix.into(),
            wait,
            drain,
            metrics,
        }
    }

    pub fn inbox_prefix(&self) -> &str {
        &self.inbox_prefix
    }

    /// Reply subject for `token`.
    pub fn reply_subject(&self, token: Token) -> String {
        format!("{}.{}", self.inbox_prefix, token)
    }

    /// Send `payload` to `target` and wait for its reply.
    ///
    /// A fresh token is generated unless the caller supplies one. Publish
    /// failures return at once; a missing reply fails after the wait timeout
    /// and its pending record is removed.
    pub async fn request(
        &self,
        target: Role,
        command: &str,
        payload: String,
        token: Option<Token>,
    ) -> Result<String, RequestError> {
        if self.drain.is_draining() {
            return Err(RequestError::Draining);
        }
        validate_target(target, command)?;

        let token = token.unwrap_or_else(|| self.tokens.next_token());
        let subject = target.json_request_subject(command);

        // Register before publishing so a fast reply always finds its record
        let rx = self.pending.register(token, &subject, Some(self.wait))?;

        let envelope = Envelope::request(token, payload, self.reply_subject(token), command);
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.pending.cancel(&token);
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .bus
            .publish_with_reply(&subject, &envelope.reply_to, bytes)
            .await
        {
            self.pending.cancel(&token);
            warn!(token = %token, subject = %subject, error = %e, "Publish failed");
            return Err(RequestError::Publish(e));
        }

        debug!(token = %token, subject = %subject, "Published request");

        match tokio::time::timeout(self.wait, rx).await {
            Ok(Ok(reply)) => {
                debug!(
                    token = %token,
                    response_ms = reply.response_time.as_millis() as u64,
                    "Reply received"
                );
                reply.result.map_err(RequestError::Remote)
            }
            // Sender dropped without a reply: the record was cancelled or expired
            Ok(Err(_)) => {
                self.metrics.record_timeout();
                Err(RequestError::Timeout {
                    token,
                    waited: self.wait,
                })
            }
            Err(_) => {
                self.pending.expire(&token);
                self.metrics.record_timeout();
                Err(RequestError::Timeout {
                    token,
                    waited: self.wait,
                })
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }
}

/// Reject targets the api role cannot address and commands that would
/// change the subject shape.
pub fn validate_target(target: Role, command: &str) -> Result<(), RequestError> {
    if !target.is_worker() {
        return Err(RequestError::BadRequest(format!(
            "'{}' is not a worker role",
            target
        )));
    }
    if command.is_empty() {
        return Err(RequestError::BadRequest("command cannot be empty".into()));
    }
    if command
        .chars()
        .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace())
    {
        return Err(RequestError::BadRequest(format!(
            "command '{}' cannot contain '.', '*', '>' or whitespace",
            command
        )));
    }
    Ok(())
}
