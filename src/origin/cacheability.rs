//! Cacheability decision over an origin response.
//!
//! Checks run in order and the first disqualifying one wins:
//!
//! 1. status not 200/404, or `Cache-Control: private` → `status`
//! 2. no-store/no-cache (respect mode only) or `Vary: *` → hit-for-pass
//! 3. Content-Type outside the allowlist → `content-type`
//! 4. body shorter than 3 characters → `body-too-small`
//! 5. GraphQL cache identity disagrees with the request's → `graphql-mismatch`
//! 6. plugin veto → `plugin-blocked` (or hit-for-pass on demand)
//!
//! Checks 1-3 only need headers, so the streaming tee can run them before
//! forking the body.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::cache::{CacheConfig, CacheControl, CacheRecord};
use crate::config::Config;
use crate::constants::MIN_CACHEABLE_BODY_CHARS;
use crate::headers::HeaderList;
use crate::error::KasumiError;
use crate::pipeline::RequestContext;
use crate::plugins::{CacheVerdict, PluginPipeline, ResponseView};
use crate::response::{EngineResponse, ResponseBody, HOP_BY_HOP_HEADERS, SANITIZED_HEADERS};

use super::OriginResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Status,
    HitForPass,
    BodyTooSmall,
    ContentType,
    GraphqlMismatch,
    PluginBlocked,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Status => "status",
            SkipReason::HitForPass => "hit-for-pass",
            SkipReason::BodyTooSmall => "body-too-small",
            SkipReason::ContentType => "content-type",
            SkipReason::GraphqlMismatch => "graphql-mismatch",
            SkipReason::PluginBlocked => "plugin-blocked",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an origin fetch through the cacheability pipeline
#[derive(Debug)]
pub struct FetchResult {
    pub response: EngineResponse,
    /// Record to persist: a cache variant, or a pass marker on hit-for-pass
    pub record: Option<CacheRecord>,
    pub skip: bool,
    pub reason: Option<SkipReason>,
}

impl FetchResult {
    pub fn cacheable(response: EngineResponse, record: CacheRecord) -> Self {
        Self {
            response,
            record: Some(record),
            skip: false,
            reason: None,
        }
    }

    /// A skipped fetch; hit-for-pass carries the marker to persist
    pub fn skipped(response: EngineResponse, reason: SkipReason, pass: Option<CacheRecord>) -> Self {
        Self {
            response,
            record: pass,
            skip: true,
            reason: Some(reason),
        }
    }

    /// Whether a cache-variant record is going to be stored
    pub fn is_cached(&self) -> bool {
        matches!(self.record, Some(CacheRecord::Cache(_)))
    }
}

/// Skip after a header-phase rejection; hit-for-pass carries a pass marker
pub(crate) fn header_skip(response: OriginResponse, reason: SkipReason, now: u64, cache: &CacheConfig) -> FetchResult {
    let pass = (reason == SkipReason::HitForPass).then(|| CacheRecord::hit_for_pass(now, cache.hit_for_pass()));
    FetchResult::skipped(response, reason, pass)
}

/// Run every check against a fully buffered origin response.
///
/// Header-phase rejections return the origin stream untouched; anything
/// that gets as far as reading the body is returned buffered.
pub async fn evaluate_buffered(
    ctx: &RequestContext,
    response: OriginResponse,
    config: &Config,
    plugins: &PluginPipeline,
    now: u64,
) -> Result<FetchResult, KasumiError> {
    if let Err(reason) = check_headers(response.status, &response.headers, &config.cache) {
        return Ok(header_skip(response, reason, now, &config.cache));
    }

    let EngineResponse {
        status,
        status_text,
        headers,
        body,
    } = response;
    let bytes = body.collect().await?;
    let buffered = |bytes| EngineResponse {
        status,
        status_text: status_text.clone(),
        headers: headers.clone(),
        body: ResponseBody::Full(bytes),
    };

    let Ok(text) = std::str::from_utf8(&bytes) else {
        return Ok(FetchResult::skipped(buffered(bytes.clone()), SkipReason::ContentType, None));
    };

    if let Err(reason) = check_body(ctx, &headers, text, config) {
        return Ok(FetchResult::skipped(buffered(bytes.clone()), reason, None));
    }

    let view = ResponseView {
        status,
        headers: &headers,
        body: text,
    };
    match plugins.should_cache(ctx, &view).await {
        CacheVerdict::Cache => {}
        CacheVerdict::Block => {
            return Ok(FetchResult::skipped(buffered(bytes.clone()), SkipReason::PluginBlocked, None));
        }
        CacheVerdict::HitForPass => {
            let pass = CacheRecord::hit_for_pass(now, config.cache.hit_for_pass());
            return Ok(FetchResult::skipped(buffered(bytes.clone()), SkipReason::HitForPass, Some(pass)));
        }
    }

    let record = build_record(status, &status_text, &headers, text.to_string(), now, &config.cache);
    Ok(FetchResult::cacheable(buffered(bytes.clone()), record))
}

/// Checks 1-3
pub fn check_headers(status: u16, headers: &HeaderList, cache: &CacheConfig) -> Result<(), SkipReason> {
    let cache_control = response_cache_control(headers);

    if !(status == 200 || status == 404) || cache_control.private {
        return Err(SkipReason::Status);
    }

    let vary_star = headers.get_all("vary").any(|v| v.trim() == "*");
    if (cache.respect_private_no_cache && cache_control.forbids_storage()) || vary_star {
        return Err(SkipReason::HitForPass);
    }

    let cacheable_type = headers
        .get("content-type")
        .map(|ct| cache.is_cacheable_content_type(ct))
        .unwrap_or(false);
    if !cacheable_type {
        return Err(SkipReason::ContentType);
    }

    Ok(())
}

/// Checks 4-5
pub fn check_body(ctx: &RequestContext, headers: &HeaderList, body: &str, config: &Config) -> Result<(), SkipReason> {
    if body.chars().count() < MIN_CACHEABLE_BODY_CHARS {
        return Err(SkipReason::BodyTooSmall);
    }

    if ctx.is_graphql {
        if let Some(requested) = &ctx.graphql_cache_id {
            let returned = headers.get(&config.request.graphql_cache_id_header);
            if returned.is_some_and(|r| r.trim() != requested) {
                return Err(SkipReason::GraphqlMismatch);
            }
        }
    }

    Ok(())
}

/// Fresh lifetime: s-maxage, then max-age when Cache-Control is respected;
/// otherwise (or when the derived value is zero) the configured default.
pub fn compute_ttl(headers: &HeaderList, cache: &CacheConfig) -> Duration {
    if cache.respect_cache_control {
        response_cache_control(headers).effective_ttl(cache.default_ttl())
    } else {
        cache.default_ttl()
    }
}

/// Headers as persisted: no internal, identity-leaking, connection-level or
/// Set-Cookie headers.
pub fn headers_for_storage(headers: &HeaderList) -> BTreeMap<String, String> {
    let mut kept = headers.clone();
    for name in SANITIZED_HEADERS.iter().chain(HOP_BY_HOP_HEADERS) {
        kept.remove(name);
    }
    kept.remove("Set-Cookie");
    kept.to_map()
}

/// Build the record for a response that passed every check
pub fn build_record(
    status: u16,
    status_text: &str,
    headers: &HeaderList,
    body: String,
    now: u64,
    cache: &CacheConfig,
) -> CacheRecord {
    CacheRecord::cached(
        status,
        status_text,
        headers_for_storage(headers),
        body,
        now,
        compute_ttl(headers, cache),
        cache.grace(),
    )
}

fn response_cache_control(headers: &HeaderList) -> CacheControl {
    let cache_control = CacheControl::parse(&headers.get_all("cache-control").collect::<Vec<_>>().join(","));
    let surrogate = CacheControl::parse(&headers.get_all("surrogate-control").collect::<Vec<_>>().join(","));
    cache_control.merge(&surrogate)
}
