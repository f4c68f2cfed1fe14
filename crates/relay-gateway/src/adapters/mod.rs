//! Adapters for the outbound ports.

pub mod memory_cache;
#[cfg(feature = "redis")]
pub mod redis_cache;
pub mod sqlite_store;

pub use memory_cache::MemoryCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
pub use sqlite_store::SqliteStore;
