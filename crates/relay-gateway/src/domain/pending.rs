//! Pending Request Store - bridges a waiting HTTP call to its bus reply.
//!
//! Maps tokens to the completion handle of the HTTP request awaiting them.

use crate::domain::envelope::Token;
use crate::domain::error::RequestError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Reply delivered to a waiting request
#[derive(Debug)]
pub struct PendingReply {
    /// Token this reply is for
    pub token: Token,
    /// Worker result, or the error text of an error reply
    pub result: Result<String, String>,
    /// Time between register and complete
    pub response_time: Duration,
}

/// A pending request waiting for its reply
struct PendingRequest {
    sender: oneshot::Sender<PendingReply>,
    created_at: Instant,
    /// Target subject (for logging)
    subject: String,
    timeout: Duration,
}

/// Statistics for pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests completed by a reply
    pub total_completed: AtomicU64,
    /// Total requests removed by timeout
    pub total_timeouts: AtomicU64,
    /// Total requests cancelled (publish failed or caller gone)
    pub total_cancelled: AtomicU64,
    /// Replies that matched no pending request
    pub total_unmatched: AtomicU64,
}

/// Pending request store for the api role.
///
/// Flow:
/// 1. The requester picks a token and calls `register()`
/// 2. It publishes the envelope with a reply subject carrying the token
/// 3. The response router receives the reply and calls `complete()`
/// 4. The requester awaits the receiver, calling `expire()` on timeout
pub struct PendingRequestStore {
    pending: DashMap<Token, PendingRequest>,
    default_timeout: Duration,
    stats: Arc<PendingStats>,
}

impl PendingRequestStore {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            default_timeout,
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a pending request.
    ///
    /// Fails if `token` is already pending; a second registration would make
    /// one of the two callers receive the other's reply.
    pub fn register(
        &self,
        token: Token,
        subject: &str,
        timeout: Option<Duration>,
    ) -> Result<oneshot::Receiver<PendingReply>, RequestError> {
        let (tx, rx) = oneshot::channel();

        match self.pending.entry(token) {
            Entry::Occupied(_) => return Err(RequestError::DuplicateToken(token)),
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    sender: tx,
                    created_at: Instant::now(),
                    subject: subject.to_string(),
                    timeout: timeout.unwrap_or(self.default_timeout),
                });
            }
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(token = %token, subject = subject, "Registered pending request");
        Ok(rx)
    }

    /// Complete a pending request with a reply.
    ///
    /// Returns false if the token is unknown (never registered, already
    /// completed or timed out) or the caller went away.
    pub fn complete(&self, token: Token, result: Result<String, String>) -> bool {
        let Some((_, pending)) = self.pending.remove(&token) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(token = %token, "Reply for unknown or expired token dropped");
            return false;
        };

        let response_time = pending.created_at.elapsed();
        let reply = PendingReply {
            token,
            result,
            response_time,
        };

        match pending.sender.send(reply) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    token = %token,
                    subject = pending.subject,
                    response_time_ms = response_time.as_millis(),
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(token = %token, subject = pending.subject, "Pending request receiver dropped");
                false
            }
        }
    }

    /// Remove a request whose caller gave up waiting.
    ///
    /// Counted as a timeout. Returns false if a reply won the race.
    pub fn expire(&self, token: &Token) -> bool {
        match self.pending.remove(token) {
            Some((_, pending)) => {
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    token = %token,
                    subject = pending.subject,
                    elapsed_ms = pending.created_at.elapsed().as_millis(),
                    "Pending request timed out"
                );
                true
            }
            None => false,
        }
    }

    /// Remove a request that will never be answered (publish failed).
    pub fn cancel(&self, token: &Token) -> bool {
        if self.pending.remove(token).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Remove requests older than their timeout whose caller never expired
    /// them (e.g. the HTTP connection was dropped mid-wait).
    ///
    /// Returns the number of requests removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|token, request| {
            let elapsed = now.duration_since(request.created_at);
            if elapsed > request.timeout {
                warn!(
                    token = %token,
                    subject = request.subject,
                    elapsed_ms = elapsed.as_millis(),
                    timeout_ms = request.timeout.as_millis(),
                    "Removing expired pending request"
                );
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, token: &Token) -> bool {
        self.pending.contains_key(token)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    pub fn stats_json(&self) -> serde_json::Value {
        serde_json::json!({
            "current": self.pending_count(),
            "registered": self.stats.total_registered.load(Ordering::Relaxed),
            "completed": self.stats.total_completed.load(Ordering::Relaxed),
            "timeouts": self.stats.total_timeouts.load(Ordering::Relaxed),
            "cancelled": self.stats.total_cancelled.load(Ordering::Relaxed),
            "unmatched": self.stats.total_unmatched.load(Ordering::Relaxed),
        })
    }
}

/// Background task to clean up abandoned requests
pub async fn cleanup_task(store: Arc<PendingRequestStore>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = store.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired pending requests");
        }
    }
}
