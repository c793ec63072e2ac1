//! Upstream request construction.
//!
//! Client headers are copied, minus connection-level ones. Cookies are cut
//! down to an allowlist for cacheable requests so personalized state never
//! reaches a response that will be shared; bypassed requests keep everything.

use url::Url;

use super::OriginRequest;
use crate::config::Config;
use crate::headers::cookie_pairs;
use crate::pipeline::RequestContext;
use crate::response::HOP_BY_HOP_HEADERS;

pub fn build_origin_request(ctx: &RequestContext, config: &Config) -> OriginRequest {
    let origin = &config.origin;
    let override_base = origin.override_base();

    let url = match &override_base {
        Some(base) => retarget(&ctx.url, base),
        None => ctx.url.clone(),
    };

    let mut headers = ctx.headers.clone();
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
    // reqwest negotiates its own encoding and decodes the body
    headers.remove("Accept-Encoding");

    let host = match (&override_base, origin.rewrite_host_header) {
        (Some(base), true) => authority(base),
        _ => ctx.host.clone(),
    };
    headers.insert("Host", host);

    if !ctx.is_bypassed() {
        match filter_cookies(ctx, config) {
            Some(cookie) => headers.insert("Cookie", cookie),
            None => headers.remove("Cookie"),
        }
    }

    // A cacheable HEAD is fetched as GET so the body can be stored; the
    // engine strips it before answering
    let method = if ctx.is_head() && !ctx.is_bypassed() {
        "GET".to_string()
    } else {
        ctx.method.clone()
    };

    OriginRequest {
        method,
        url,
        headers,
        body: ctx.body.clone(),
    }
}

/// Cookies forwarded for a cacheable request. Static assets get none.
fn filter_cookies(ctx: &RequestContext, config: &Config) -> Option<String> {
    if ctx.is_static {
        return None;
    }
    let raw = ctx.cookie_header.as_deref()?;
    let cache = &config.cache;
    let kept: Vec<String> = cookie_pairs(raw)
        .filter(|(name, _)| {
            cache.cookie_allowlist.iter().any(|allowed| allowed == name)
                || (cache.cache_logged_in && *name == cache.session_cookie)
        })
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    (!kept.is_empty()).then(|| kept.join("; "))
}

/// Same path and query, scheme/host/port taken from the override base
fn retarget(url: &Url, base: &Url) -> Url {
    let mut target = base.clone();
    target.set_path(url.path());
    target.set_query(url.query());
    target
}

fn authority(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_string(),
    }
}
