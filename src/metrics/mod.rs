// Metrics module - Prometheus collectors for cache decisions
//
// Every counter is labelled by the closed vocabulary it observes (cache
// status, skip reason, bypass reason, background task, store operation), so
// the export stays bounded no matter what traffic looks like.

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::response::CacheStatus;

/// Global metrics registry for the cache engine
pub struct KasumiMetrics {
    /// Responses by cache status (HIT, STALE, MISS, UNCACHEABLE)
    pub cache_status: IntCounterVec,

    /// Origin responses that were not cached, by skip reason
    pub cache_skips: IntCounterVec,

    /// Requests that bypassed the cache, by bypass reason
    pub bypass: IntCounterVec,

    /// Failed detached tasks (revalidation, tee capture)
    pub background_failures: IntCounterVec,

    /// Record store failures by operation (get, put, delete, list)
    pub store_errors: IntCounterVec,

    /// Keys deleted through the purge endpoint
    pub purged_keys: IntCounter,

    /// Origin fetch latency up to response headers (seconds)
    pub origin_fetch_duration: Histogram,
}

static METRICS: OnceLock<KasumiMetrics> = OnceLock::new();

impl KasumiMetrics {
    /// Initialize and return the global metrics instance
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| {
            let cache_status = register_int_counter_vec!(
                "kasumi_cache_status_total",
                "Responses served by cache status",
                &["status"]
            )
            .expect("Failed to register cache_status_total metric");

            let cache_skips = register_int_counter_vec!(
                "kasumi_cache_skips_total",
                "Origin responses not cached by skip reason",
                &["reason"]
            )
            .expect("Failed to register cache_skips_total metric");

            let bypass = register_int_counter_vec!(
                "kasumi_bypass_total",
                "Requests that bypassed the cache by reason",
                &["reason"]
            )
            .expect("Failed to register bypass_total metric");

            let background_failures = register_int_counter_vec!(
                "kasumi_background_failures_total",
                "Background tasks that ended in an error",
                &["task"]
            )
            .expect("Failed to register background_failures_total metric");

            let store_errors = register_int_counter_vec!(
                "kasumi_store_errors_total",
                "Record store failures by operation",
                &["operation"]
            )
            .expect("Failed to register store_errors_total metric");

            let purged_keys = register_int_counter!(
                "kasumi_purged_keys_total",
                "Cache keys deleted through purge requests"
            )
            .expect("Failed to register purged_keys_total metric");

            let origin_fetch_duration = register_histogram!(
                "kasumi_origin_fetch_duration_seconds",
                "Origin fetch latency up to response headers in seconds",
                vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
            )
            .expect("Failed to register origin_fetch_duration_seconds metric");

            KasumiMetrics {
                cache_status,
                cache_skips,
                bypass,
                background_failures,
                store_errors,
                purged_keys,
                origin_fetch_duration,
            }
        })
    }

    pub fn record_status(&self, status: CacheStatus) {
        self.cache_status.with_label_values(&[status.as_str()]).inc();
    }

    pub fn record_skip(&self, reason: &str) {
        self.cache_skips.with_label_values(&[reason]).inc();
    }

    pub fn record_bypass(&self, reason: &str) {
        self.bypass.with_label_values(&[reason]).inc();
    }

    pub fn record_background_failure(&self, task: &str) {
        self.background_failures.with_label_values(&[task]).inc();
    }

    pub fn record_store_error(&self, operation: &str) {
        self.store_errors.with_label_values(&[operation]).inc();
    }

    /// Render every registered collector in the Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
