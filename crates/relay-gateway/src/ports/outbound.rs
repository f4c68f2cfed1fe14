//! Outbound ports.
//!
//! The core only talks to its collaborators through these traits; adapters
//! live in `crate::adapters`.

use crate::domain::envelope::{Envelope, Token};
use crate::domain::error::{CacheError, ComputeError, StoreError};
use async_trait::async_trait;
use std::time::Duration;

/// Key/value result cache with per-entry expiry.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Whether the cache is reachable right now.
    async fn ping(&self) -> bool;
}

/// Append-only record table: `(auto id, token, text)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the table if absent. Idempotent.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Append a row, returning its generated id.
    async fn insert(&self, token: Token, text: &str) -> Result<i64, StoreError>;

    /// Text of the first row stored for `token`.
    async fn select_first(&self, token: Token) -> Result<Option<String>, StoreError>;

    async fn ping(&self) -> bool;
}

/// A role's computation.
#[async_trait]
pub trait Compute: Send + Sync {
    fn name(&self) -> &'static str;

    async fn compute(&self, request: &Envelope) -> Result<String, ComputeError>;
}
