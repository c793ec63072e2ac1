// Engine module - the per-request cache decision
//
// handle() runs, in order: purge dispatch, normalization, plugin on_request,
// bypass policy, key derivation, record lookup and the state machine over
// the stored record, then response header hygiene and plugin response
// transforms.

use bytes::Bytes;
use std::sync::Arc;

use crate::admin::purge;
use crate::cache::{
    build_store, now_millis, CacheKeyDeriver, CacheRecord, CachedResponse, KvStore, RecordState,
    RecordStore,
};
use crate::config::{CompiledPatterns, Config};
use crate::error::KasumiError;
use crate::headers::HeaderList;
use crate::metrics::KasumiMetrics;
use crate::origin::cacheability::evaluate_buffered;
use crate::origin::tee::{tee_response, TeeCapture};
use crate::origin::{build_origin_request, FetchResult, HttpOrigin, Origin, OriginResponse};
use crate::pipeline::{evaluate_bypass, IncomingRequest, Normalizer, RequestContext};
use crate::plugins::{registry, AssetProber, HttpAssetProber, Plugin, PluginDeps, PluginPipeline};
use crate::response::{apply_response_headers, CacheStatus, EngineResponse, ResponseBody};

pub mod background;

pub use background::BackgroundTasks;

/// Origin access plus everything needed to judge and persist what comes
/// back. Cloned into revalidation tasks.
#[derive(Clone)]
struct Fetcher {
    config: Arc<Config>,
    store: RecordStore,
    origin: Arc<dyn Origin>,
    plugins: PluginPipeline,
}

impl Fetcher {
    async fn fetch_origin(&self, ctx: &RequestContext) -> Result<OriginResponse, KasumiError> {
        let request = build_origin_request(ctx, &self.config);
        let request = self.plugins.transform_origin_request(ctx, request);
        tracing::debug!(
            request_id = %ctx.request_id(),
            method = %request.method,
            url = %request.url,
            "Fetching from origin"
        );
        let timer = KasumiMetrics::global().origin_fetch_duration.start_timer();
        let result = self.origin.fetch(request).await;
        timer.observe_duration();
        result
    }

    /// Write a record; failures are logged and the next request misses again
    async fn persist(&self, ctx: &RequestContext, key: &str, record: &CacheRecord, now: u64) {
        match self.store.put(key, record, now).await {
            Ok(()) => ctx.claim(match record {
                CacheRecord::Cache(_) => "stored",
                CacheRecord::Pass { .. } => "stored-pass",
            }),
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Failed to store cache record");
                KasumiMetrics::global().record_store_error("put");
            }
        }
    }

    /// Background refresh of a stale record through the buffered pipeline
    async fn revalidate(&self, ctx: Arc<RequestContext>, key: String) -> Result<(), KasumiError> {
        let now = now_millis();
        let response = self.fetch_origin(&ctx).await?;
        let result = evaluate_buffered(&ctx, response, &self.config, &self.plugins, now).await?;
        note_skip(&ctx, &result);
        if let Some(record) = &result.record {
            self.store.put(&key, record, now).await.map_err(|e| {
                KasumiMetrics::global().record_store_error("put");
                KasumiError::from(e)
            })?;
        }
        tracing::debug!(cache_key = %key, stored = result.record.is_some(), "Revalidation finished");
        Ok(())
    }
}

pub struct CacheEngine {
    config: Arc<Config>,
    normalizer: Normalizer,
    keys: CacheKeyDeriver,
    fetcher: Fetcher,
    tasks: Arc<BackgroundTasks>,
}

impl CacheEngine {
    /// Assemble an engine from its collaborators. Patterns are compiled and
    /// the plugin pipeline is built here, once.
    pub fn new(
        config: Config,
        kv: Arc<dyn KvStore>,
        origin: Arc<dyn Origin>,
        prober: Arc<dyn AssetProber>,
    ) -> Result<Self, KasumiError> {
        let patterns: Arc<CompiledPatterns> = Arc::new(config.compile().map_err(KasumiError::Config)?);
        let plugins = registry(
            &config,
            &patterns,
            PluginDeps {
                kv: kv.clone(),
                prober,
            },
        )?;
        let config = Arc::new(config);

        tracing::info!(
            namespace = %config.cache.namespace,
            streaming = config.cache.streaming,
            plugins = ?plugins.names(),
            "Cache engine initialized"
        );

        Ok(Self {
            normalizer: Normalizer::new(config.clone(), patterns),
            keys: CacheKeyDeriver::new(&config),
            fetcher: Fetcher {
                config: config.clone(),
                store: RecordStore::new(kv),
                origin,
                plugins,
            },
            config,
            tasks: Arc::new(BackgroundTasks::new()),
        })
    }

    /// Production wiring: configured store, reqwest origin and asset prober
    pub fn from_config(config: Config) -> Result<Self, KasumiError> {
        let kv = build_store(&config.store)?;
        let origin = Arc::new(HttpOrigin::new(&config.origin)?);
        let prober = Arc::new(HttpAssetProber::new(config.plugins.asset_guard.probe_timeout())?);
        Self::new(config, kv, origin, prober)
    }

    /// Register an embedder-supplied plugin. It runs after the configured ones.
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        tracing::debug!(plugin = plugin.name(), "Registering extra plugin");
        self.fetcher.plugins.push(plugin);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.fetcher.store
    }

    pub fn plugins(&self) -> &PluginPipeline {
        &self.fetcher.plugins
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Detached work registered by requests (revalidation, tee capture)
    pub fn tasks(&self) -> Arc<BackgroundTasks> {
        self.tasks.clone()
    }

    /// Derive, transform and bind the key for a request
    pub fn cache_key(&self, ctx: &RequestContext) -> String {
        let key = self.keys.derive(ctx);
        let key = self.fetcher.plugins.transform_cache_key(ctx, key);
        ctx.set_cache_key(key.clone());
        key
    }

    pub async fn handle(&self, request: IncomingRequest) -> EngineResponse {
        if purge::is_purge_request(&request, &self.config.purge) {
            return purge::handle_purge(self, request).await;
        }

        let ctx = Arc::new(self.normalizer.normalize(request));

        if let Some(response) = self.fetcher.plugins.on_request(&ctx).await {
            return self.fetcher.plugins.transform_response(&ctx, response);
        }

        let (mut response, status) = self.decide(&ctx).await;
        if ctx.is_head() {
            response = response.into_head();
        }

        apply_response_headers(&mut response, status, ctx.is_static);
        KasumiMetrics::global().record_status(status);
        tracing::debug!(
            request_id = %ctx.request_id(),
            cache_key = ctx.cache_key().unwrap_or("-"),
            cache_status = %status,
            claims = ?ctx.claims(),
            "Cache decision"
        );

        self.fetcher.plugins.transform_response(&ctx, response)
    }

    async fn decide(&self, ctx: &Arc<RequestContext>) -> (EngineResponse, CacheStatus) {
        let bypass = evaluate_bypass(ctx, &self.config.request);
        if bypass.bypass {
            let reason = bypass.reason.unwrap_or_default();
            ctx.mark_bypassed();
            ctx.claim(format!("bypass:{}", reason));
            let label = reason.split(':').next().unwrap_or_default();
            KasumiMetrics::global().record_bypass(label);
            return (self.pass_through(ctx).await, CacheStatus::Uncacheable);
        }

        let key = self.cache_key(ctx);
        let now = now_millis();

        let record = match self.fetcher.store.get(&key).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Cache lookup failed; treating as miss");
                KasumiMetrics::global().record_store_error("get");
                None
            }
        };

        let state = record.as_ref().map(|r| r.classify(now));
        match (record, state) {
            (Some(CacheRecord::Cache(cached)), Some(RecordState::Fresh)) => {
                self.serve_cached(ctx, &key, cached, false).await
            }
            (Some(CacheRecord::Cache(cached)), Some(RecordState::StaleServable)) => {
                self.serve_cached(ctx, &key, cached, true).await
            }
            (Some(_), Some(RecordState::PassActive)) => {
                ctx.claim("hit-for-pass");
                (self.pass_through(ctx).await, CacheStatus::Uncacheable)
            }
            (Some(_), _) => {
                ctx.claim("cache-expired");
                self.miss(ctx, &key, now).await
            }
            (None, _) => {
                ctx.claim("cache-miss");
                self.miss(ctx, &key, now).await
            }
        }
    }

    async fn serve_cached(
        &self,
        ctx: &Arc<RequestContext>,
        key: &str,
        cached: CachedResponse,
        stale: bool,
    ) -> (EngineResponse, CacheStatus) {
        if !self.fetcher.plugins.validate_cache_hit(ctx, &cached).await {
            if let Err(e) = self.fetcher.store.delete(key).await {
                tracing::warn!(cache_key = %key, error = %e, "Failed to delete rejected record");
                KasumiMetrics::global().record_store_error("delete");
            }
            ctx.claim("cache-invalidated");
            // A rejected record is refetched synchronously, never served stale
            return match self.fetch(ctx, key, now_millis()).await {
                Ok(result) => (result.response, CacheStatus::Miss),
                Err(e) => (origin_failure(ctx, e), CacheStatus::Uncacheable),
            };
        }

        let status = if stale {
            ctx.claim("cache-stale");
            let fetcher = self.fetcher.clone();
            let ctx = ctx.clone();
            let key = key.to_string();
            self.tasks
                .spawn("revalidate", async move { fetcher.revalidate(ctx, key).await });
            CacheStatus::Stale
        } else {
            ctx.claim("cache-hit");
            CacheStatus::Hit
        };

        (EngineResponse::from_record(&cached), status)
    }

    async fn miss(&self, ctx: &Arc<RequestContext>, key: &str, now: u64) -> (EngineResponse, CacheStatus) {
        match self.fetch(ctx, key, now).await {
            Ok(result) => {
                let status = if result.skip {
                    CacheStatus::Uncacheable
                } else {
                    CacheStatus::Miss
                };
                (result.response, status)
            }
            Err(e) => (origin_failure(ctx, e), CacheStatus::Uncacheable),
        }
    }

    /// Origin fetch through the buffered pipeline or the streaming tee,
    /// persisting whatever record comes out of it
    async fn fetch(&self, ctx: &Arc<RequestContext>, key: &str, now: u64) -> Result<FetchResult, KasumiError> {
        let response = self.fetcher.fetch_origin(ctx).await?;

        let result = if self.config.cache.streaming {
            let capture = TeeCapture {
                ctx: ctx.clone(),
                config: self.config.clone(),
                store: self.fetcher.store.clone(),
                key: key.to_string(),
            };
            tee_response(response, capture, &self.tasks, now)
        } else {
            evaluate_buffered(ctx, response, &self.config, &self.fetcher.plugins, now).await?
        };

        note_skip(ctx, &result);
        if let Some(record) = &result.record {
            self.fetcher.persist(ctx, key, record, now).await;
        }
        Ok(result)
    }

    async fn pass_through(&self, ctx: &RequestContext) -> EngineResponse {
        match self.fetcher.fetch_origin(ctx).await {
            Ok(response) => response,
            Err(e) => origin_failure(ctx, e),
        }
    }
}

fn note_skip(ctx: &RequestContext, result: &FetchResult) {
    if let Some(reason) = result.reason {
        ctx.claim(format!("skip:{}", reason));
        KasumiMetrics::global().record_skip(reason.as_str());
    }
}

fn origin_failure(ctx: &RequestContext, error: KasumiError) -> EngineResponse {
    tracing::warn!(
        request_id = %ctx.request_id(),
        url = %ctx.url,
        error = %error,
        "Origin fetch failed"
    );
    ctx.claim("origin-error");
    let mut headers = HeaderList::new();
    headers.insert("Content-Type", "text/plain; charset=utf-8");
    EngineResponse::new(
        error.http_status(),
        headers,
        ResponseBody::Full(Bytes::from_static(b"Bad Gateway")),
    )
}
