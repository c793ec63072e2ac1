//! Cache records and their state classification.
//!
//! Records are persisted as JSON with a `state` discriminator:
//!
//! ```json
//! {"state":"cache","status":200,"statusText":"OK","headers":{...},
//!  "body":"...","expires":1700000000000,"staleUntil":1700000600000}
//! {"state":"pass","expires":1700000120000}
//! ```
//!
//! All instants are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::constants::MIN_STORE_TTL_SECONDS;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub expires: u64,
    pub stale_until: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CacheRecord {
    Cache(CachedResponse),
    Pass { expires: u64 },
}

/// Where a stored record sits relative to `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Fresh,
    StaleServable,
    Expired,
    PassActive,
}

impl CacheRecord {
    /// Build a cache-variant record. `stale_until` is never before `expires`.
    pub fn cached(
        status: u16,
        status_text: impl Into<String>,
        headers: BTreeMap<String, String>,
        body: String,
        now: u64,
        ttl: Duration,
        grace: Duration,
    ) -> Self {
        let expires = now.saturating_add(ttl.as_millis() as u64);
        let stale_until = expires.saturating_add(grace.as_millis() as u64);
        CacheRecord::Cache(CachedResponse {
            status,
            status_text: status_text.into(),
            headers,
            body,
            expires,
            stale_until,
        })
    }

    pub fn hit_for_pass(now: u64, window: Duration) -> Self {
        CacheRecord::Pass {
            expires: now.saturating_add(window.as_millis() as u64),
        }
    }

    pub fn classify(&self, now: u64) -> RecordState {
        match self {
            CacheRecord::Pass { expires } if now < *expires => RecordState::PassActive,
            CacheRecord::Pass { .. } => RecordState::Expired,
            CacheRecord::Cache(cached) if now < cached.expires => RecordState::Fresh,
            CacheRecord::Cache(cached) if now < cached.stale_until => RecordState::StaleServable,
            CacheRecord::Cache(_) => RecordState::Expired,
        }
    }

    /// TTL handed to the key-value store: time until `staleUntil` (cache) or
    /// `expires` (pass), rounded up, never below the store floor.
    pub fn store_ttl(&self, now: u64) -> Duration {
        let deadline = match self {
            CacheRecord::Cache(cached) => cached.stale_until,
            CacheRecord::Pass { expires } => *expires,
        };
        let remaining_ms = deadline.saturating_sub(now);
        let secs = remaining_ms.div_ceil(1000);
        Duration::from_secs(secs.max(MIN_STORE_TTL_SECONDS))
    }
}
