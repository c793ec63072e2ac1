//! Cache policy and record store configuration.
//!
//! `CacheConfig` holds the origin-defined TTL/grace policy that deliberately
//! overrides standard HTTP cache semantics, plus the vary axes folded into
//! every cache key. `StoreConfig` selects the key-value backend.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::redis::RedisConfig;
use crate::constants::{
    DEFAULT_GRACE_SECONDS, DEFAULT_HIT_FOR_PASS_SECONDS, DEFAULT_MEMORY_MAX_ENTRIES,
    DEFAULT_NAMESPACE, DEFAULT_TTL_SECONDS,
};

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_grace_seconds() -> u64 {
    DEFAULT_GRACE_SECONDS
}

fn default_hit_for_pass_seconds() -> u64 {
    DEFAULT_HIT_FOR_PASS_SECONDS
}

fn default_cacheable_content_types() -> Vec<String> {
    vec!["text/html".to_string(), "application/json".to_string()]
}

fn default_vary_cookies() -> Vec<String> {
    vec!["X-Magento-Vary".to_string()]
}

fn default_cookie_allowlist() -> Vec<String> {
    vec![
        "X-Magento-Vary".to_string(),
        "store".to_string(),
        "currency".to_string(),
    ]
}

fn default_session_cookie() -> String {
    "PHPSESSID".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mobile_pattern() -> String {
    r"(?i)iPhone|iPod|Android.*Mobile|Windows Phone|IEMobile|BlackBerry|Opera Mini|webOS".to_string()
}

fn default_tablet_pattern() -> String {
    r"(?i)iPad|Tablet|Android|Kindle|Silk|PlayBook".to_string()
}

/// Device-class variation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Append `::device:<class>` to every key (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// User-Agent regex checked first
    #[serde(default = "default_mobile_pattern")]
    pub mobile_pattern: String,
    /// User-Agent regex checked when the mobile pattern did not match
    #[serde(default = "default_tablet_pattern")]
    pub tablet_pattern: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mobile_pattern: default_mobile_pattern(),
            tablet_pattern: default_tablet_pattern(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Prefix of every derived cache key (default: "fpc:")
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Fresh lifetime used unless Cache-Control is respected (default: 1 day)
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    /// Stale-while-revalidate window after expiry (default: 3 days)
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,

    /// Lifetime of hit-for-pass markers (default: 120s)
    #[serde(default = "default_hit_for_pass_seconds")]
    pub hit_for_pass_seconds: u64,

    /// Derive TTL from s-maxage / max-age instead of the default TTL
    #[serde(default)]
    pub respect_cache_control: bool,

    /// Treat no-store / no-cache from the origin as hit-for-pass
    #[serde(default)]
    pub respect_private_no_cache: bool,

    /// MIME types (without parameters) eligible for caching
    #[serde(default = "default_cacheable_content_types")]
    pub cacheable_content_types: Vec<String>,

    /// Ordered cookie names whose values vary the cache key
    #[serde(default = "default_vary_cookies")]
    pub vary_cookies: Vec<String>,

    /// Request headers whose values vary the cache key
    #[serde(default)]
    pub vary_headers: Vec<String>,

    /// Cookies forwarded to the origin for cacheable requests
    #[serde(default = "default_cookie_allowlist")]
    pub cookie_allowlist: Vec<String>,

    /// Forward the session cookie as well (logged-in pages are cacheable)
    #[serde(default)]
    pub cache_logged_in: bool,

    /// Session cookie forwarded when `cache_logged_in` is set
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Stream misses to the client while capturing them in the background
    #[serde(default)]
    pub streaming: bool,

    #[serde(default)]
    pub device: DeviceConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default_ttl_seconds: default_ttl_seconds(),
            grace_seconds: default_grace_seconds(),
            hit_for_pass_seconds: default_hit_for_pass_seconds(),
            respect_cache_control: false,
            respect_private_no_cache: false,
            cacheable_content_types: default_cacheable_content_types(),
            vary_cookies: default_vary_cookies(),
            vary_headers: Vec::new(),
            cookie_allowlist: default_cookie_allowlist(),
            cache_logged_in: false,
            session_cookie: default_session_cookie(),
            streaming: false,
            device: DeviceConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }

    pub fn hit_for_pass(&self) -> Duration {
        Duration::from_secs(self.hit_for_pass_seconds)
    }

    /// Whether a Content-Type value (parameters ignored) is in the allowlist
    pub fn is_cacheable_content_type(&self, content_type: &str) -> bool {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        !mime.is_empty()
            && self
                .cacheable_content_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&mime))
    }

    /// Validate cache configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.is_empty() {
            return Err("cache.namespace cannot be empty".to_string());
        }
        if self.default_ttl_seconds == 0 {
            return Err("cache.default_ttl_seconds must be greater than 0".to_string());
        }
        if self.grace_seconds == 0 {
            return Err("cache.grace_seconds must be greater than 0".to_string());
        }
        if self.hit_for_pass_seconds == 0 {
            return Err("cache.hit_for_pass_seconds must be greater than 0".to_string());
        }
        if self.cacheable_content_types.is_empty() {
            return Err("cache.cacheable_content_types cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Key-value backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Maximum number of stored records (default: 100000)
    #[serde(default = "default_memory_max_entries")]
    pub max_entries: u64,
}

fn default_memory_max_entries() -> u64 {
    DEFAULT_MEMORY_MAX_ENTRIES
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: default_memory_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub memory: MemoryStoreConfig,
    #[serde(default)]
    pub redis: RedisConfig,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == StoreBackend::Redis && self.redis.redis_url.is_none() {
            return Err("store.redis.redis_url is required when backend is redis".to_string());
        }
        if self.memory.max_entries == 0 {
            return Err("store.memory.max_entries must be greater than 0".to_string());
        }
        Ok(())
    }
}
