// Redis key-value store
//
// The connection manager is created lazily on first use so the store can be
// built before the serving runtime exists.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::config::RedisConfig;
use crate::cache::error::StoreError;
use crate::cache::traits::{KvStore, ListPage};

pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    config: RedisConfig,
}

impl RedisStore {
    /// Creates a new RedisStore
    ///
    /// # Errors
    ///
    /// Returns StoreError::Unavailable if `redis_url` is missing, or
    /// StoreError::Redis if the URL cannot be parsed. No connection is made
    /// here.
    pub fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let redis_url = config
            .redis_url
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("redis_url is required".to_string()))?;
        let client = Client::open(redis_url.as_str())?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            config,
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.config.redis_key_prefix, key)
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let connect = ConnectionManager::new(self.client.clone());
                match tokio::time::timeout(self.config.connection_timeout(), connect).await {
                    Ok(result) => result.map_err(StoreError::from),
                    Err(_) => Err(StoreError::Unavailable(
                        "timed out connecting to Redis".to_string(),
                    )),
                }
            })
            .await?;
        Ok(manager.clone())
    }

    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.config.operation_timeout(), fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Unavailable(format!(
                "Redis {} timed out",
                operation
            ))),
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        let key = self.prefixed(key);
        self.with_timeout("GET", conn.get::<_, Option<String>>(key))
            .await
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let cmd = redis::cmd("SET")
            .arg(self.prefixed(key))
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .to_owned();
        self.with_timeout("SET", cmd.query_async::<()>(&mut conn))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = self.prefixed(key);
        self.with_timeout("DEL", conn.del::<_, ()>(key)).await
    }

    /// SCAN over `<prefix>*`; the cursor is Redis's own scan cursor
    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<ListPage, StoreError> {
        let mut conn = self.connection().await?;
        let cursor: u64 = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| StoreError::Unavailable(format!("invalid scan cursor '{}'", c)))?,
            None => 0,
        };
        let cmd = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(format!("{}*", self.config.redis_key_prefix))
            .arg("COUNT")
            .arg(limit)
            .to_owned();
        let (next, raw_keys): (u64, Vec<String>) = self
            .with_timeout("SCAN", cmd.query_async(&mut conn))
            .await?;

        let keys = raw_keys
            .into_iter()
            .filter_map(|k| {
                k.strip_prefix(self.config.redis_key_prefix.as_str())
                    .map(str::to_string)
            })
            .collect();
        let complete = next == 0;

        Ok(ListPage {
            keys,
            next_cursor: (!complete).then(|| next.to_string()),
            complete,
        })
    }
}
