//! Rewrites absolute links to the backend host back to the edge host.
//!
//! In origin-override deployments the backend renders its own base URL into
//! pages. Buffered HTML bodies get those links pointed at the host the client
//! actually used; streamed bodies pass through untouched.

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use url::Url;

use super::Plugin;
use crate::error::KasumiError;
use crate::pipeline::RequestContext;
use crate::response::{EngineResponse, ResponseBody};

pub struct AssetLinkRewriter {
    /// `https?://<backend authority>` followed by a URL delimiter
    pattern: Regex,
}

impl AssetLinkRewriter {
    pub fn new(origin: &Url) -> Result<Self, KasumiError> {
        let host = origin.host_str().unwrap_or_default();
        let authority = match origin.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let pattern = Regex::new(&format!(
            r#"https?://{}([/"'\s?#)<]|$)"#,
            regex::escape(&authority)
        ))
        .map_err(|e| KasumiError::Config(format!("asset_links pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Rewrite `body` for a client that reached us at `scheme://host`.
    /// Returns `None` when nothing matched.
    pub fn rewrite(&self, body: &str, scheme: &str, host: &str) -> Option<String> {
        if !self.pattern.is_match(body) {
            return None;
        }
        let replacement = format!("{}://{}${{1}}", scheme, host);
        Some(self.pattern.replace_all(body, replacement.as_str()).into_owned())
    }
}

#[async_trait]
impl Plugin for AssetLinkRewriter {
    fn name(&self) -> &'static str {
        "asset_links"
    }

    fn transform_response(&self, ctx: &RequestContext, mut response: EngineResponse) -> EngineResponse {
        if !response.is_html() {
            return response;
        }
        // Only buffered bodies are rewritten. Streamed HTML (tee-mode misses,
        // bypassed and hit-for-pass pages) keeps the backend's links, so
        // deployments relying on this should leave cache.streaming off.
        let ResponseBody::Full(bytes) = &response.body else {
            return response;
        };
        let Ok(body) = std::str::from_utf8(bytes) else {
            return response;
        };
        if let Some(rewritten) = self.rewrite(body, ctx.original_url.scheme(), &ctx.host) {
            ctx.claim("asset-links-rewritten");
            response.body = ResponseBody::Full(Bytes::from(rewritten));
        }
        response
    }
}
