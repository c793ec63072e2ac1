//! Key-value store trait definition
//!
//! The decision engine only ever needs get / put-with-ttl / delete / paginated
//! list over string values. Backends: `MemoryStore` (moka) and `RedisStore`.

use async_trait::async_trait;
use std::time::Duration;

use super::error::StoreError;

/// One page of a key listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Opaque cursor for the next call; `None` once `complete`
    pub next_cursor: Option<String>,
    pub complete: bool,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns None if the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value, for `ttl`
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List up to `limit` keys starting after `cursor`. Keys deleted between
    /// calls must not cause later keys to be skipped.
    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<ListPage, StoreError>;
}
