// Constants module - centralized default values for configuration
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers keeps the defaults in one place.

// =============================================================================
// Server defaults
// =============================================================================

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

/// Default maximum request body read into memory (2 MB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Default path of the Prometheus text export
pub const DEFAULT_METRICS_PATH: &str = "/__kasumi/metrics";

// =============================================================================
// Origin defaults
// =============================================================================

/// Default total origin fetch timeout in milliseconds
pub const DEFAULT_ORIGIN_TIMEOUT_MS: u64 = 15_000;

/// Default origin connect timeout in milliseconds
pub const DEFAULT_ORIGIN_CONNECT_TIMEOUT_MS: u64 = 3_000;

// =============================================================================
// Cache defaults
// =============================================================================

/// Namespace prefix of every derived cache key
pub const DEFAULT_NAMESPACE: &str = "fpc:";

/// Default fresh lifetime in seconds (1 day)
pub const DEFAULT_TTL_SECONDS: u64 = 86_400;

/// Default grace window after expiry in seconds (3 days)
pub const DEFAULT_GRACE_SECONDS: u64 = 259_200;

/// Default hit-for-pass marker lifetime in seconds
pub const DEFAULT_HIT_FOR_PASS_SECONDS: u64 = 120;

/// Store TTLs are never shorter than this, so the store never evicts a
/// record before its own logical expiry has been observed.
pub const MIN_STORE_TTL_SECONDS: u64 = 60;

/// Bodies shorter than this many characters are never cached
pub const MIN_CACHEABLE_BODY_CHARS: usize = 3;

/// Default in-memory store capacity (entries)
pub const DEFAULT_MEMORY_MAX_ENTRIES: u64 = 100_000;

// =============================================================================
// Purge defaults
// =============================================================================

/// Header carrying the purge shared secret
pub const DEFAULT_PURGE_SECRET_HEADER: &str = "X-Purge-Secret";

/// Path that always routes to the purge handler for POST requests
pub const DEFAULT_PURGE_PATH: &str = "/__kasumi/purge";

/// Keys requested per `list` call during a full sweep
pub const DEFAULT_PURGE_PAGE_SIZE: usize = 1000;

// =============================================================================
// Asset guard defaults
// =============================================================================

/// Memoized asset probe lifetime in seconds
pub const DEFAULT_ASSET_PROBE_TTL_SECONDS: u64 = 300;

/// HEAD probe timeout in milliseconds
pub const DEFAULT_ASSET_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Chunks a streaming client may fall behind the origin before the tee
/// waits for it
pub const TEE_CLIENT_BUFFER_CHUNKS: usize = 16;

// =============================================================================
// Response header names set by the engine
// =============================================================================

/// Cache status indicator (HIT, STALE, MISS, UNCACHEABLE)
pub const CACHE_STATUS_HEADER: &str = "X-FPC-Cache";

/// Present only on STALE responses
pub const GRACE_HEADER: &str = "X-FPC-Grace";
