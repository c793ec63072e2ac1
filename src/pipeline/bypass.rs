//! Bypass policy: should this request skip the cache entirely?
//!
//! Rules are evaluated in a fixed order and the first match wins. Excluded
//! paths match by substring, so excluding `/cart` also excludes
//! `/promo/cart-deals`.

use super::RequestContext;
use crate::config::RequestConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassResult {
    pub bypass: bool,
    /// Diagnostic token; never used for branching
    pub reason: Option<String>,
}

impl BypassResult {
    fn proceed() -> Self {
        Self {
            bypass: false,
            reason: None,
        }
    }

    fn skip(reason: impl Into<String>) -> Self {
        Self {
            bypass: true,
            reason: Some(reason.into()),
        }
    }
}

pub fn evaluate_bypass(ctx: &RequestContext, config: &RequestConfig) -> BypassResult {
    let method = ctx.method.to_ascii_uppercase();
    if method != "GET" && method != "HEAD" {
        return BypassResult::skip(format!("method:{}", method));
    }
    if method == "HEAD" && ctx.headers.contains("range") {
        return BypassResult::skip("range-head");
    }
    if ctx.is_health_check {
        return BypassResult::skip("health-check");
    }
    if ctx.is_static {
        return BypassResult::skip("static-asset");
    }
    if config
        .excluded_paths
        .iter()
        .any(|excluded| ctx.path.contains(excluded.as_str()))
    {
        return BypassResult::skip("excluded-path");
    }
    if ctx.is_graphql && ctx.has_bearer && ctx.graphql_cache_id.is_none() {
        return BypassResult::skip("graphql-auth-pass");
    }
    BypassResult::proceed()
}
