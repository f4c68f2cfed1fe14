//! Relay counters and the throughput monitor.
//!
//! [`RelayMetrics`] is the one counter set of a process, shared by the HTTP
//! handlers, the worker loop and the executor. [`ThroughputMonitor`] samples
//! it once per period and logs rate and average throughput.

use crate::domain::role::Role;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Sampling period of the monitor loop.
pub const MONITOR_PERIOD: Duration = Duration::from_secs(1);

/// Relay counters
#[derive(Default)]
pub struct RelayMetrics {
    // Request counters
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,

    // Cache-aside counters
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_errors: AtomicU64,

    // Bus counters
    pub replies_published: AtomicU64,
    pub replies_failed: AtomicU64,
    pub duplicates_dropped: AtomicU64,
    pub timeouts: AtomicU64,

    // Latency tracking (simplified, no histogram)
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one accepted request. This is the counter the monitor samples.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how an accepted request ended.
    pub fn record_outcome(&self, success: bool, latency_ms: u64) {
        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reply(&self, published: bool) {
        if published {
            self.replies_published.fetch_add(1, Ordering::Relaxed);
        } else {
            self.replies_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_duplicate(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": {
                "total": self.requests_total.load(Ordering::Relaxed),
                "success": self.requests_success.load(Ordering::Relaxed),
                "error": self.requests_error.load(Ordering::Relaxed),
                "timeouts": self.timeouts.load(Ordering::Relaxed),
            },
            "cache": {
                "hits": self.cache_hits.load(Ordering::Relaxed),
                "misses": self.cache_misses.load(Ordering::Relaxed),
                "errors": self.cache_errors.load(Ordering::Relaxed),
            },
            "bus": {
                "replies_published": self.replies_published.load(Ordering::Relaxed),
                "replies_failed": self.replies_failed.load(Ordering::Relaxed),
                "duplicates_dropped": self.duplicates_dropped.load(Ordering::Relaxed),
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<RelayMetrics>,
}

impl RequestTimer {
    /// Counts the request and starts the clock.
    pub fn start(metrics: Arc<RelayMetrics>) -> Self {
        metrics.record_request();
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, success: bool) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.metrics.record_outcome(success, latency_ms);
    }
}

/// One monitor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// Time since the monitor started
    pub elapsed: Duration,
    /// Cumulative requests
    pub requests_total: u64,
    /// Requests since the previous sample
    pub rate: u64,
    /// `requests_total / elapsed` in requests per second
    pub throughput: f64,
}

/// Periodic sampler over [`RelayMetrics::requests_total`].
pub struct ThroughputMonitor {
    role: Role,
    metrics: Arc<RelayMetrics>,
    started: Instant,
    last_total: u64,
}

impl ThroughputMonitor {
    pub fn new(role: Role, metrics: Arc<RelayMetrics>) -> Self {
        Self::starting_at(role, metrics, Instant::now())
    }

    pub fn starting_at(role: Role, metrics: Arc<RelayMetrics>, started: Instant) -> Self {
        Self {
            role,
            metrics,
            started,
            last_total: 0,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Take a reading as of `now` and advance the tick snapshot.
    pub fn sample_at(&mut self, now: Instant) -> ThroughputSample {
        let total = self.metrics.requests();
        let elapsed = now.saturating_duration_since(self.started);
        let rate = total.saturating_sub(self.last_total);
        self.last_total = total;

        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 { total as f64 / secs } else { 0.0 };

        ThroughputSample {
            elapsed,
            requests_total: total,
            rate,
            throughput,
        }
    }

    /// Sample every `period` and log the reading. Never returns.
    pub async fn run(mut self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let sample = self.sample_at(Instant::now());
            info!(
                role = %self.role,
                time_ms = sample.elapsed.as_millis() as u64,
                requests = sample.requests_total,
                rps = sample.rate,
                throughput = format!("{:.2}", sample.throughput),
                "Throughput"
            );
        }
    }
}
