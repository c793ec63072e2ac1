//! URL canonicalization and request fact extraction.
//!
//! Marketing parameters are removed from the query; the remaining pairs are
//! kept verbatim (no decode/re-encode) so the normalized URL sent to the
//! origin differs from the client's only by what was stripped.

use std::sync::Arc;
use url::Url;

use super::{IncomingRequest, RequestContext};
use crate::cache::DeviceClass;
use crate::config::{CompiledPatterns, Config};

pub struct Normalizer {
    config: Arc<Config>,
    patterns: Arc<CompiledPatterns>,
}

impl Normalizer {
    pub fn new(config: Arc<Config>, patterns: Arc<CompiledPatterns>) -> Self {
        Self { config, patterns }
    }

    /// Build the per-request context. Performs no I/O.
    pub fn normalize(&self, request: IncomingRequest) -> RequestContext {
        let IncomingRequest {
            method,
            url: original_url,
            headers,
            body,
        } = request;

        let (kept, stripped) = self.split_query(original_url.query());
        let url = with_query(&original_url, &kept);

        let mut ctx = RequestContext::new(method, original_url, url, headers, body);
        for param in &stripped {
            ctx.claim(format!("strip-param:{}", param));
        }
        ctx.query = kept;
        ctx.stripped_params = stripped;

        let request = &self.config.request;
        ctx.ssl_offload = request
            .ssl_offload_headers
            .iter()
            .find_map(|name| ctx.headers.get(name))
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        ctx.is_static = self.patterns.static_asset.is_match(&ctx.path);
        ctx.is_health_check = self.patterns.health_check.is_match(&ctx.path);
        ctx.is_graphql = ctx.path.starts_with(&request.graphql_path);
        ctx.graphql_cache_id = non_empty(ctx.headers.get(&request.graphql_cache_id_header));
        ctx.has_bearer = ctx
            .headers
            .get("authorization")
            .map(is_bearer)
            .unwrap_or(false);
        ctx.store = non_empty(ctx.headers.get(&request.store_header));
        ctx.currency = non_empty(ctx.headers.get(&request.currency_header));
        ctx.device = self.device_class(ctx.headers.get("user-agent"));

        ctx
    }

    /// Normalize only the URL, for callers that need the canonical form
    /// without a full context (purge targets).
    pub fn normalize_url(&self, url: &Url) -> Url {
        let (kept, _) = self.split_query(url.query());
        with_query(url, &kept)
    }

    fn split_query(&self, query: Option<&str>) -> (Vec<(String, String)>, Vec<String>) {
        let mut kept = Vec::new();
        let mut stripped = Vec::new();
        for segment in query.unwrap_or("").split('&') {
            if segment.is_empty() {
                continue;
            }
            let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
            let decoded = urlencoding::decode(name)
                .map(|n| n.into_owned())
                .unwrap_or_else(|_| name.to_string());
            if self.patterns.is_marketing_param(&decoded) {
                stripped.push(decoded);
            } else {
                kept.push((name.to_string(), value.to_string()));
            }
        }
        (kept, stripped)
    }

    fn device_class(&self, user_agent: Option<&str>) -> DeviceClass {
        let ua = user_agent.unwrap_or("");
        if self.patterns.mobile.is_match(ua) {
            DeviceClass::Mobile
        } else if self.patterns.tablet.is_match(ua) {
            DeviceClass::Tablet
        } else {
            DeviceClass::Desktop
        }
    }
}

pub(crate) fn render_pair(name: &str, value: &str) -> String {
    format!("{}={}", name, value)
}

fn with_query(url: &Url, pairs: &[(String, String)]) -> Url {
    let mut url = url.clone();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let query = pairs
            .iter()
            .map(|(name, value)| render_pair(name, value))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }
    url
}

fn is_bearer(value: &str) -> bool {
    let value = value.trim_start();
    value.len() > 7
        && value
            .get(..7)
            .map_or(false, |scheme| scheme.eq_ignore_ascii_case("bearer "))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
