//! Exposes the cache key and decision trail on every response.

use async_trait::async_trait;

use super::Plugin;
use crate::pipeline::RequestContext;
use crate::response::EngineResponse;

pub const KEY_HEADER: &str = "X-Kasumi-Key";
pub const CLAIMS_HEADER: &str = "X-Kasumi-Claims";

pub struct DebugHeaders;

#[async_trait]
impl Plugin for DebugHeaders {
    fn name(&self) -> &'static str {
        "debug_headers"
    }

    fn transform_response(&self, ctx: &RequestContext, mut response: EngineResponse) -> EngineResponse {
        if let Some(key) = ctx.cache_key() {
            response.headers.insert(KEY_HEADER, key);
        }
        response.headers.insert(CLAIMS_HEADER, ctx.claims().join(", "));
        response
    }
}
