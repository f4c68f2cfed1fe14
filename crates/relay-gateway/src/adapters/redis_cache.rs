//! Redis result cache, shared by every replica of a role.
//!
//! Enabled with the `redis` feature. The connection manager reconnects on
//! its own; while Redis is down every call fails fast and the executor
//! treats it as a miss.

use crate::domain::error::CacheError;
use crate::ports::outbound::ResultCache;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

/// Cache backed by a Redis server.
pub struct RedisCache {
    manager: ConnectionManager,
    url: String,
}

impl RedisCache {
    /// Connect to `host:port` or a full `redis://` URL.
    pub async fn connect(address: &str) -> Result<Self, CacheError> {
        let url = normalize_url(address);
        let client =
            redis::Client::open(url.as_str()).map_err(|e| CacheError::Unreachable(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Unreachable(e.to_string()))?;

        info!(url = %url, "Connected to Redis cache");
        Ok(Self { manager, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn normalize_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))
    }

    async fn ping(&self) -> bool {
        let mut conn = self.manager.clone();
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }
}
