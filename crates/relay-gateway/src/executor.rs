//! Cache-aside executor.
//!
//! Wraps a role [`Compute`] with the result cache. The cache is an
//! optimization only: lookup failures count as misses and write failures are
//! logged, so a cache outage costs latency, never a result.

use crate::compute::data::is_read_command;
use crate::domain::config::GatewayConfig;
use crate::domain::envelope::Envelope;
use crate::domain::error::ComputeError;
use crate::domain::role::{CacheKeyMode, Role};
use crate::monitor::RelayMetrics;
use crate::ports::outbound::{Compute, ResultCache};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How the executor uses the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub role: Role,
    pub enabled: bool,
    pub ttl: Duration,
    pub key_mode: CacheKeyMode,
}

impl CachePolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            role: config.role,
            enabled: config.cache.enabled,
            ttl: config.cache.ttl,
            key_mode: config.cache_key_mode(),
        }
    }

    /// Cache key for `request`.
    ///
    /// `Token` keys on the correlation token alone; `Digest` keys on command
    /// and payload so equal inputs share an entry across tokens. Records of
    /// the `data` role belong to their token, so it always keys by token.
    pub fn key_for(&self, request: &Envelope) -> String {
        if self.role == Role::Data || self.key_mode == CacheKeyMode::Token {
            return format!("{}:{}", self.role, request.token);
        }

        let mut hasher = Sha256::new();
        hasher.update(request.command.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.payload.as_bytes());
        format!("{}:{}", self.role, hex::encode(hasher.finalize()))
    }

    /// Whether `request` mutates durable state and must always reach the
    /// computation.
    pub fn is_write(&self, request: &Envelope) -> bool {
        self.role == Role::Data && !is_read_command(&request.command)
    }
}

pub struct CacheAsideExecutor {
    compute: Arc<dyn Compute>,
    cache: Arc<dyn ResultCache>,
    policy: CachePolicy,
    metrics: Arc<RelayMetrics>,
}

impl CacheAsideExecutor {
    pub fn new(
        compute: Arc<dyn Compute>,
        cache: Arc<dyn ResultCache>,
        policy: CachePolicy,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            compute,
            cache,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Run `request` through the cache policy.
    pub async fn execute(&self, request: &Envelope) -> Result<String, ComputeError> {
        if !self.policy.enabled {
            return self.compute.compute(request).await;
        }

        let key = self.policy.key_for(request);
        if self.policy.is_write(request) {
            return self.write_through(request, &key).await;
        }

        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                self.metrics.record_cache_hit();
                debug!(token = %request.token, key = %key, "Cache hit");
                return Ok(hit);
            }
            Ok(None) => self.metrics.record_cache_miss(),
            Err(e) => {
                self.metrics.record_cache_error();
                self.metrics.record_cache_miss();
                warn!(token = %request.token, error = %e, "Cache lookup failed, computing directly");
            }
        }

        let result = self.compute.compute(request).await?;

        if let Err(e) = self.cache.set(&key, &result, self.policy.ttl).await {
            self.metrics.record_cache_error();
            warn!(token = %request.token, error = %e, "Cache write failed, result not cached");
        }

        Ok(result)
    }

    /// Persist first, then seed the cache for later reads.
    ///
    /// Reads return the first record of a token, so an existing entry is
    /// left alone.
    async fn write_through(&self, request: &Envelope, key: &str) -> Result<String, ComputeError> {
        let result = self.compute.compute(request).await?;

        match self.cache.get(key).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(e) = self.cache.set(key, &request.payload, self.policy.ttl).await {
                    self.metrics.record_cache_error();
                    warn!(token = %request.token, error = %e, "Cache write failed, record not cached");
                }
            }
            Err(e) => {
                self.metrics.record_cache_error();
                warn!(token = %request.token, error = %e, "Cache lookup failed, record not cached");
            }
        }

        Ok(result)
    }
}
