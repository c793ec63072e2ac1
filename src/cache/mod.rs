// Cache module: records, keys, policy configuration and key-value backends

use std::sync::Arc;

pub mod config;
pub mod control;
pub mod error;
pub mod key;
pub mod memory;
pub mod record;
pub mod redis;
pub mod store;
pub mod traits;

pub use config::{CacheConfig, DeviceConfig, MemoryStoreConfig, StoreBackend, StoreConfig};
pub use control::CacheControl;
pub use error::StoreError;
pub use key::{CacheKeyDeriver, DeviceClass};
pub use memory::MemoryStore;
pub use record::{now_millis, CacheRecord, CachedResponse, RecordState};
pub use self::redis::{RedisConfig, RedisStore};
pub use store::RecordStore;
pub use traits::{KvStore, ListPage};

/// Build the configured key-value backend
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new(&config.memory))),
        StoreBackend::Redis => Ok(Arc::new(RedisStore::new(config.redis.clone())?)),
    }
}
