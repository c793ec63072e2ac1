// Plugins module - ordered extension hooks around cache decisions
//
// A plugin implements any subset of six hooks. The pipeline calls each hook
// across every enabled plugin in registry order:
//
// - transform_cache_key / transform_origin_request / transform_response fold:
//   each plugin receives the previous plugin's output
// - validate_cache_hit / should_cache stop at the first rejection
// - on_request stops at the first plugin that answers the request itself
//
// Plugins observe and veto; the engine works the same with none enabled.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::{CachedResponse, KvStore};
use crate::config::{CompiledPatterns, Config};
use crate::error::KasumiError;
use crate::headers::HeaderList;
use crate::origin::OriginRequest;
use crate::pipeline::RequestContext;
use crate::response::EngineResponse;

pub mod asset_guard;
pub mod asset_links;
pub mod debug;

pub use asset_guard::{AssetGuard, AssetProber, HttpAssetProber};
pub use asset_links::AssetLinkRewriter;
pub use debug::DebugHeaders;

/// A buffered origin response as seen by `should_cache`
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    pub status: u16,
    pub headers: &'a HeaderList,
    pub body: &'a str,
}

/// A plugin's opinion on storing an origin response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
    Cache,
    /// Do not store; skip reason `plugin-blocked`
    Block,
    /// Do not store; remember the key as uncacheable for the pass window
    HitForPass,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Answer the request directly. The response skips caching entirely.
    async fn on_request(&self, _ctx: &RequestContext) -> Option<EngineResponse> {
        None
    }

    fn transform_cache_key(&self, _ctx: &RequestContext, key: String) -> String {
        key
    }

    fn transform_origin_request(&self, _ctx: &RequestContext, request: OriginRequest) -> OriginRequest {
        request
    }

    /// Return false to reject a stored record before it is served
    async fn validate_cache_hit(&self, _ctx: &RequestContext, _cached: &CachedResponse) -> bool {
        true
    }

    async fn should_cache(&self, _ctx: &RequestContext, _response: &ResponseView<'_>) -> CacheVerdict {
        CacheVerdict::Cache
    }

    fn transform_response(&self, _ctx: &RequestContext, response: EngineResponse) -> EngineResponse {
        response
    }
}

#[derive(Clone, Default)]
pub struct PluginPipeline {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginPipeline {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Append a plugin after the registry-built ones
    pub fn push(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn on_request(&self, ctx: &RequestContext) -> Option<EngineResponse> {
        for plugin in &self.plugins {
            if let Some(response) = plugin.on_request(ctx).await {
                ctx.claim(format!("plugin-response:{}", plugin.name()));
                return Some(response);
            }
        }
        None
    }

    pub fn transform_cache_key(&self, ctx: &RequestContext, key: String) -> String {
        self.plugins
            .iter()
            .fold(key, |key, plugin| plugin.transform_cache_key(ctx, key))
    }

    pub fn transform_origin_request(&self, ctx: &RequestContext, request: OriginRequest) -> OriginRequest {
        self.plugins
            .iter()
            .fold(request, |request, plugin| plugin.transform_origin_request(ctx, request))
    }

    pub async fn validate_cache_hit(&self, ctx: &RequestContext, cached: &CachedResponse) -> bool {
        for plugin in &self.plugins {
            if !plugin.validate_cache_hit(ctx, cached).await {
                ctx.claim(format!("hit-rejected:{}", plugin.name()));
                return false;
            }
        }
        true
    }

    pub async fn should_cache(&self, ctx: &RequestContext, response: &ResponseView<'_>) -> CacheVerdict {
        for plugin in &self.plugins {
            let verdict = plugin.should_cache(ctx, response).await;
            if verdict != CacheVerdict::Cache {
                ctx.claim(format!("cache-vetoed:{}", plugin.name()));
                return verdict;
            }
        }
        CacheVerdict::Cache
    }

    pub fn transform_response(&self, ctx: &RequestContext, response: EngineResponse) -> EngineResponse {
        self.plugins
            .iter()
            .fold(response, |response, plugin| plugin.transform_response(ctx, response))
    }
}

/// Collaborators plugins may need
#[derive(Clone)]
pub struct PluginDeps {
    pub kv: Arc<dyn KvStore>,
    pub prober: Arc<dyn AssetProber>,
}

/// Build the pipeline from the fixed registry, keeping enabled plugins only.
/// Order: asset_guard, asset_links, debug_headers.
pub fn registry(
    config: &Config,
    patterns: &CompiledPatterns,
    deps: PluginDeps,
) -> Result<PluginPipeline, KasumiError> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();

    if config.plugins.asset_guard.enabled {
        plugins.push(Arc::new(AssetGuard::new(
            config,
            patterns.stylesheet.clone(),
            deps.kv.clone(),
            deps.prober.clone(),
        )));
    }

    if config.plugins.asset_links.enabled {
        match config.origin.override_base() {
            Some(base) => plugins.push(Arc::new(AssetLinkRewriter::new(&base)?)),
            None => tracing::warn!("asset_links is enabled but origin.override_url is not set; skipping"),
        }
    }

    if config.plugins.debug_headers.enabled {
        plugins.push(Arc::new(DebugHeaders));
    }

    Ok(PluginPipeline::new(plugins))
}
