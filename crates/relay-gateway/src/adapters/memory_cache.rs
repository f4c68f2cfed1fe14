//! In-process result cache.
//!
//! Default cache for single-node runs and tests. Entries expire lazily on
//! read. A write that takes the map past `max_entries` purges expired
//! entries, then evicts the ones closest to expiry until the map is back
//! under its low-water mark.

use crate::domain::error::CacheError;
use crate::ports::outbound::ResultCache;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on live entries.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// TTL map backed by `DashMap`.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// `max_entries` is clamped to at least one.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Bring the map back under its bound.
    fn evict(&self) {
        let purged = self.purge_expired();

        // evict a tenth below the bound so the scan runs once per batch of writes
        let low_water = self.max_entries - self.max_entries / 10;
        let excess = self.entries.len().saturating_sub(low_water);
        if excess > 0 {
            let mut by_expiry: Vec<(Instant, String)> = self
                .entries
                .iter()
                .map(|entry| (entry.expires_at, entry.key().clone()))
                .collect();
            by_expiry.sort_unstable();
            for (_, key) in by_expiry.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }

        debug!(
            purged,
            evicted = excess,
            remaining = self.entries.len(),
            "Cache over capacity"
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        match hit {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );

        if self.entries.len() > self.max_entries {
            self.evict();
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryCache::new();
        cache
            .set("ascii:abc", "banner", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get("ascii:abc").await.unwrap().as_deref(), Some("banner"));
        assert_eq!(cache.get("ascii:other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("data:42", "hello", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("data:42").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_on_overflow() {
        let cache = MemoryCache::with_max_entries(2);
        cache.set("a", "1", Duration::from_millis(5)).await.unwrap();
        cache.set("b", "2", Duration::from_millis(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.set("c", "3", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.ping().await);
    }

    #[tokio::test]
    async fn test_live_entries_are_bounded() {
        let cache = MemoryCache::with_max_entries(100);
        for i in 0..999 {
            cache
                .set(&format!("ascii:{i}"), "banner", Duration::from_secs(300))
                .await
                .unwrap();
            assert!(cache.len() <= 100);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        cache
            .set("ascii:999", "banner", Duration::from_secs(300))
            .await
            .unwrap();
        assert!(cache.len() <= 100);

        // the entries closest to expiry went first
        assert_eq!(cache.get("ascii:999").await.unwrap().as_deref(), Some("banner"));
        assert_eq!(cache.get("ascii:0").await.unwrap(), None);
    }
}
