// Redis store configuration module

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis-specific store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379/0"); the database
    /// number, user and password are taken from the URL
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix prepended to every stored key (default: "kasumi:")
    #[serde(default = "default_redis_key_prefix")]
    pub redis_key_prefix: String,

    /// Connection timeout in milliseconds (default: 5000 = 5 seconds)
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Operation timeout in milliseconds (default: 2000 = 2 seconds)
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_key_prefix: default_redis_key_prefix(),
            connection_timeout_ms: default_connection_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

fn default_redis_key_prefix() -> String {
    "kasumi:".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    5000 // 5 seconds
}

fn default_operation_timeout_ms() -> u64 {
    2000 // 2 seconds
}
