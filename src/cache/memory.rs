//! In-process key-value store backed by moka
//!
//! Every entry carries its own deadline; a moka `Expiry` turns the caller's
//! TTL into a per-entry expiration so records and probe memos with very
//! different lifetimes share one cache.

use async_trait::async_trait;
use moka::Expiry;
use std::time::{Duration, Instant};

use super::config::MemoryStoreConfig;
use super::error::StoreError;
use super::traits::{KvStore, ListPage};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires: Instant,
}

struct EntryExpiry;

impl Expiry<String, MemoryEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires.saturating_duration_since(updated_at))
    }
}

/// MemoryStore wraps moka for the `KvStore` trait
pub struct MemoryStore {
    cache: moka::future::Cache<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new(config: &MemoryStoreConfig) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(EntryExpiry)
            .eviction_listener(|key, _value, cause| {
                use moka::notification::RemovalCause;
                if cause == RemovalCause::Size {
                    tracing::debug!(key = %key, "Memory store evicted entry under capacity pressure");
                }
            })
            .build();

        Self { cache }
    }

    /// Forces moka to process pending evictions and expirations
    pub async fn run_pending(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Approximate number of live entries
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&MemoryStoreConfig::default())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .cache
            .get(key)
            .await
            .filter(|entry| entry.expires > now)
            .map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let entry = MemoryEntry {
            value,
            expires: Instant::now() + ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    /// Keys are listed in sorted order; the cursor is the last key returned,
    /// so deleting already-listed keys between pages is safe.
    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<ListPage, StoreError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, entry)| {
                entry.expires > now && cursor.map_or(true, |c| key.as_str() > c)
            })
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        keys.sort_unstable();

        let complete = keys.len() <= limit;
        keys.truncate(limit);
        let next_cursor = if complete { None } else { keys.last().cloned() };

        Ok(ListPage {
            keys,
            next_cursor,
            complete,
        })
    }
}
