//! # Redelivery Filter
//!
//! Time-bounded memory of `(token, reply_to)` keys a worker has already
//! accepted. The bus gives no exactly-once guarantee, so a worker that must
//! not execute the same request twice can opt into this window.
//!
//! - Keys are remembered for `window` after first sight
//! - Expired keys are garbage-collected every `gc_interval`
//! - Memory is bounded by the request rate times the window

use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from the redelivery filter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RedeliveryError {
    /// The same request was already accepted inside the window.
    #[error("token {token} for '{reply_to}' already accepted {age_ms}ms ago")]
    Duplicate {
        token: u64,
        reply_to: String,
        age_ms: u128,
    },
}

/// Time-bounded duplicate detector.
pub struct RedeliveryFilter {
    /// Key -> instant first seen.
    seen: HashMap<(u64, String), Instant>,

    /// How long a key is remembered.
    window: Duration,

    /// Last garbage collection.
    last_gc: Instant,

    /// Garbage collection interval.
    gc_interval: Duration,
}

impl RedeliveryFilter {
    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

    /// Create a filter remembering keys for `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self::with_config(window, Self::DEFAULT_GC_INTERVAL.min(window))
    }

    /// Create a filter with a custom garbage collection interval.
    #[must_use]
    pub fn with_config(window: Duration, gc_interval: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            window,
            last_gc: Instant::now(),
            gc_interval,
        }
    }

    /// Record a key, failing if it was already seen inside the window.
    pub fn check_and_record(&mut self, token: u64, reply_to: &str) -> Result<(), RedeliveryError> {
        self.check_and_record_at(token, reply_to, Instant::now())
    }

    /// Same as [`check_and_record`](Self::check_and_record) with an explicit clock.
    pub fn check_and_record_at(
        &mut self,
        token: u64,
        reply_to: &str,
        now: Instant,
    ) -> Result<(), RedeliveryError> {
        if now.saturating_duration_since(self.last_gc) >= self.gc_interval {
            self.garbage_collect(now);
            self.last_gc = now;
        }

        let key = (token, reply_to.to_string());
        if let Some(first_seen) = self.seen.get(&key) {
            let age = now.saturating_duration_since(*first_seen);
            if age < self.window {
                return Err(RedeliveryError::Duplicate {
                    token,
                    reply_to: key.1,
                    age_ms: age.as_millis(),
                });
            }
        }

        self.seen.insert(key, now);
        Ok(())
    }

    /// Number of remembered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn garbage_collect(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) < window);
    }
}
