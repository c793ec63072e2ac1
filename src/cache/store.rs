//! Typed record access over a `KvStore`.

use std::sync::Arc;

use super::error::StoreError;
use super::record::CacheRecord;
use super::traits::KvStore;

#[derive(Clone)]
pub struct RecordStore {
    kv: Arc<dyn KvStore>,
}

impl RecordStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// The underlying key-value store (listing, probe memoization)
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Read a record. A value that does not decode is logged and treated as
    /// absent so the next write replaces it.
    pub async fn get(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Discarding undecodable cache record");
                Ok(None)
            }
        }
    }

    /// Write a record with a TTL derived from its own deadlines
    pub async fn put(&self, key: &str, record: &CacheRecord, now: u64) -> Result<(), StoreError> {
        let value = serde_json::to_string(record)?;
        self.kv.put(key, value, record.store_ttl(now)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.kv.delete(key).await
    }
}
