//! Purge endpoint.
//!
//! A POST carrying the configured secret header (or any POST to the purge
//! path) is a purge request. `X-Purge-All: true` sweeps the whole store page
//! by page; otherwise one URL is purged, taken from `X-Purge-Url` or from a
//! JSON body `{"url": "..."}`. The key for that URL is derived exactly as a
//! GET for it would be, with the purge request's own headers supplying the
//! vary axes.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::cache::{KvStore, StoreError};
use crate::config::PurgeConfig;
use crate::engine::CacheEngine;
use crate::metrics::KasumiMetrics;
use crate::pipeline::IncomingRequest;
use crate::response::EngineResponse;

pub const PURGE_ALL_HEADER: &str = "X-Purge-All";
pub const PURGE_URL_HEADER: &str = "X-Purge-Url";

#[derive(Debug, Deserialize)]
struct PurgeBody {
    url: Option<String>,
}

/// Whether the engine should route this request to the purge handler
pub fn is_purge_request(request: &IncomingRequest, config: &PurgeConfig) -> bool {
    config.enabled
        && request.method.eq_ignore_ascii_case("POST")
        && (request.headers.contains(&config.secret_header) || request.url.path() == config.path)
}

pub async fn handle_purge(engine: &CacheEngine, request: IncomingRequest) -> EngineResponse {
    let config = &engine.config().purge;

    let authorized = request
        .headers
        .get(&config.secret_header)
        .is_some_and(|provided| constant_time_compare(provided, &config.secret));
    if !authorized {
        tracing::warn!(path = %request.url.path(), "Purge rejected: missing or invalid secret");
        return error(401, "unauthorized");
    }

    let purge_all = request
        .headers
        .get(PURGE_ALL_HEADER)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
    if purge_all {
        return match purge_everything(engine.store().kv(), config.list_page_size).await {
            Ok(purged) => {
                KasumiMetrics::global().purged_keys.inc_by(purged);
                tracing::info!(purged, "Purged all cache keys");
                EngineResponse::json(200, &json!({"status": "ok", "purged": purged, "key": null}))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Full purge failed");
                KasumiMetrics::global().record_store_error("list");
                error(503, "store unavailable")
            }
        };
    }

    let target = match purge_target(&request) {
        Ok(target) => target,
        Err(message) => return error(400, message),
    };
    let url = match request.url.join(&target) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(target = %target, error = %e, "Unparseable purge target");
            return error(400, "invalid purge url");
        }
    };

    let mut headers = request.headers;
    headers.remove(&config.secret_header);
    headers.remove(PURGE_URL_HEADER);
    let lookup = IncomingRequest {
        method: "GET".to_string(),
        url,
        headers,
        body: Bytes::new(),
    };
    let ctx = engine.normalizer().normalize(lookup);
    let key = engine.cache_key(&ctx);

    match engine.store().delete(&key).await {
        Ok(()) => {
            KasumiMetrics::global().purged_keys.inc();
            tracing::info!(cache_key = %key, "Purged cache key");
            EngineResponse::json(200, &json!({"status": "ok", "purged": 1, "key": key}))
        }
        Err(e) => {
            tracing::warn!(cache_key = %key, error = %e, "Purge delete failed");
            KasumiMetrics::global().record_store_error("delete");
            error(503, "store unavailable")
        }
    }
}

/// Delete every key the store lists, following the cursor until the
/// listing reports completion. Returns the number of deleted keys.
pub async fn purge_everything(kv: &Arc<dyn KvStore>, page_size: usize) -> Result<u64, StoreError> {
    let mut cursor: Option<String> = None;
    let mut purged = 0u64;
    loop {
        let page = kv.list(cursor.as_deref(), page_size).await?;
        for key in &page.keys {
            kv.delete(key).await?;
            purged += 1;
        }
        tracing::debug!(page_keys = page.keys.len(), purged, "Purge sweep page");
        match page.next_cursor {
            Some(next) if !page.complete => cursor = Some(next),
            _ => break,
        }
    }
    Ok(purged)
}

fn purge_target(request: &IncomingRequest) -> Result<String, &'static str> {
    if let Some(url) = request.headers.get(PURGE_URL_HEADER).filter(|u| !u.trim().is_empty()) {
        return Ok(url.trim().to_string());
    }
    if request.body.is_empty() {
        return Err("missing purge target");
    }
    let body: PurgeBody = serde_json::from_slice(&request.body).map_err(|_| "invalid JSON body")?;
    body.url
        .filter(|u| !u.trim().is_empty())
        .ok_or("missing purge target")
}

fn error(status: u16, message: &str) -> EngineResponse {
    EngineResponse::json(status, &json!({"status": "error", "message": message}))
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
