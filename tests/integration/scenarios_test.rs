// End-to-end request scenarios: miss, hit, stale-while-revalidate, full purge

use super::test_harness::*;
use kasumi::cache::{now_millis, CacheRecord, KvStore};
use kasumi::config::Config;
use kasumi::constants::{CACHE_STATUS_HEADER, GRACE_HEADER};
use kasumi::response::ResponseBody;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn debug_config() -> Config {
    let mut config = Config::default();
    config.plugins.debug_headers.enabled = true;
    config
}

#[tokio::test]
async fn test_first_request_misses_and_strips_marketing_params() {
    let origin = MockOrigin::new(Canned::html("<html><body>sale</body></html>"));
    let kv = memory_store();
    let engine = build_engine(debug_config(), origin.clone(), kv);

    let response = engine
        .handle(get("https://shop.test/sale?gclid=abc&color=red"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("MISS"));
    assert_eq!(
        response.headers.get("X-Kasumi-Key"),
        Some("fpc:shop.test/sale?color=red::device:desktop")
    );
    assert_eq!(
        response.headers.get("cache-control"),
        Some("no-store, no-cache, must-revalidate, max-age=0")
    );
    assert_eq!(body_string(response).await, "<html><body>sale</body></html>");

    let requests = origin.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.as_str(), "https://shop.test/sale?color=red");

    let stored = engine
        .store()
        .get("fpc:shop.test/sale?color=red::device:desktop")
        .await
        .unwrap();
    assert!(matches!(stored, Some(CacheRecord::Cache(_))));
}

#[tokio::test]
async fn test_fresh_record_is_served_without_origin() {
    let origin = MockOrigin::new(Canned::html("unused"));
    let kv = memory_store();
    let engine = build_engine(Config::default(), origin.clone(), kv);

    let key = "fpc:shop.test/women.html::device:desktop";
    let seeded = record(
        "<html>women</html>",
        60_000,
        60_000,
        &[("Content-Type", "text/html"), ("Server", "nginx"), ("X-Custom", "kept")],
    );
    engine.store().put(key, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(get("https://shop.test/women.html")).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("HIT"));
    assert_eq!(response.headers.get("x-custom"), Some("kept"));
    assert_eq!(response.headers.get("content-type"), Some("text/html"));
    assert!(response.headers.get("server").is_none());
    assert!(response.headers.get(GRACE_HEADER).is_none());
    assert_eq!(body_string(response).await, "<html>women</html>");
    assert_eq!(origin.request_count(), 0);
}

#[tokio::test]
async fn test_head_hit_has_empty_body() {
    let origin = MockOrigin::new(Canned::html("unused"));
    let engine = build_engine(Config::default(), origin.clone(), memory_store());

    let key = "fpc:shop.test/women.html::device:desktop";
    let seeded = record("<html>women</html>", 60_000, 0, &[("Content-Type", "text/html")]);
    engine.store().put(key, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(head("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("HIT"));
    assert!(matches!(response.body, ResponseBody::HeadersOnly(Some(18))));
    assert_eq!(body_string(response).await, "");
}

#[tokio::test]
async fn test_head_miss_stores_the_full_page() {
    let origin = MockOrigin::new(Canned::html("<html>women</html>"));
    let engine = build_engine(Config::default(), origin.clone(), memory_store());

    let response = engine.handle(head("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("MISS"));
    assert!(matches!(response.body, ResponseBody::HeadersOnly(Some(18))));
    assert_eq!(origin.requests()[0].method, "GET");

    match engine.store().get("fpc:shop.test/women.html::device:desktop").await.unwrap() {
        Some(CacheRecord::Cache(cached)) => assert_eq!(cached.body, "<html>women</html>"),
        other => panic!("expected stored page, got {:?}", other),
    }

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("HIT"));
    assert_eq!(body_string(response).await, "<html>women</html>");
}

#[tokio::test]
async fn test_stale_head_refreshes_with_a_full_fetch() {
    let origin = MockOrigin::new(Canned::html("<html>fresh copy</html>"));
    let engine = build_engine(Config::default(), origin.clone(), memory_store());

    let key = "fpc:shop.test/women.html::device:desktop";
    let seeded = record("<html>old copy</html>", -1_000, 600_000, &[("Content-Type", "text/html")]);
    engine.store().put(key, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(head("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("STALE"));
    assert_eq!(body_string(response).await, "");

    engine.tasks().drain().await;
    assert_eq!(origin.requests()[0].method, "GET");

    match engine.store().get(key).await.unwrap() {
        Some(CacheRecord::Cache(cached)) => {
            assert_eq!(cached.body, "<html>fresh copy</html>");
            assert!(cached.expires > now_millis());
        }
        other => panic!("expected refreshed record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stale_record_served_then_refreshed_in_background() {
    let origin = MockOrigin::new(Canned::html("<html>fresh copy</html>"));
    let engine = build_engine(Config::default(), origin.clone(), memory_store());

    let key = "fpc:shop.test/women.html::device:desktop";
    let seeded = record("<html>old copy</html>", -1_000, 600_000, &[("Content-Type", "text/html")]);
    engine.store().put(key, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("STALE"));
    assert_eq!(response.headers.get(GRACE_HEADER), Some("normal"));
    assert_eq!(body_string(response).await, "<html>old copy</html>");

    engine.tasks().drain().await;
    assert_eq!(origin.request_count(), 1);

    match engine.store().get(key).await.unwrap() {
        Some(CacheRecord::Cache(cached)) => {
            assert_eq!(cached.body, "<html>fresh copy</html>");
            assert!(cached.expires > now_millis());
        }
        other => panic!("expected refreshed record, got {:?}", other),
    }

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("HIT"));
    assert_eq!(body_string(response).await, "<html>fresh copy</html>");
    assert_eq!(origin.request_count(), 1);
}

async fn assert_old_copy_survives(engine: &kasumi::engine::CacheEngine, key: &str) {
    match engine.store().get(key).await.unwrap() {
        Some(CacheRecord::Cache(cached)) => {
            assert_eq!(cached.body, "<html>old copy</html>");
            assert!(cached.expires < now_millis());
        }
        other => panic!("expected the stale record to remain, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_refresh_keeps_serving_the_stale_copy() {
    let origin = MockOrigin::new(Canned::html("<html>fresh copy</html>"));
    origin.set_failing(true);
    let engine = build_engine(Config::default(), origin.clone(), memory_store());

    let key = "fpc:shop.test/women.html::device:desktop";
    let seeded = record("<html>old copy</html>", -1_000, 600_000, &[("Content-Type", "text/html")]);
    engine.store().put(key, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("STALE"));
    assert_eq!(body_string(response).await, "<html>old copy</html>");

    engine.tasks().drain().await;
    assert!(engine.tasks().is_empty());
    assert_eq!(origin.request_count(), 1);
    assert_old_copy_survives(&engine, key).await;

    // The next request is still answered from the stale copy
    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("STALE"));
    assert_eq!(body_string(response).await, "<html>old copy</html>");
    engine.tasks().drain().await;
}

#[tokio::test]
async fn test_server_error_during_refresh_is_not_stored() {
    let origin = MockOrigin::new(Canned::html("<html>maintenance</html>").with_status(500));
    let engine = build_engine(Config::default(), origin.clone(), memory_store());

    let key = "fpc:shop.test/women.html::device:desktop";
    let seeded = record("<html>old copy</html>", -1_000, 600_000, &[("Content-Type", "text/html")]);
    engine.store().put(key, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("STALE"));
    assert_eq!(body_string(response).await, "<html>old copy</html>");

    engine.tasks().drain().await;
    assert!(engine.tasks().is_empty());
    assert_eq!(origin.request_count(), 1);
    assert_old_copy_survives(&engine, key).await;
}

#[tokio::test]
async fn test_purge_all_sweeps_every_page() {
    let mut config = Config::default();
    config.purge.enabled = true;
    config.purge.secret = "s3cr3t".to_string();

    let counting = CountingStore::new();
    let kv: Arc<dyn KvStore> = counting.clone();
    for i in 0..2500 {
        kv.put(&format!("fpc:shop.test/p{:04}", i), "{}".to_string(), Duration::from_secs(600))
            .await
            .unwrap();
    }

    let engine = build_engine(config, MockOrigin::new(Canned::html("unused")), kv.clone());
    let response = engine
        .handle(
            kasumi::pipeline::IncomingRequest::new("POST", url::Url::parse("https://shop.test/").unwrap())
                .with_header("X-Purge-Secret", "s3cr3t")
                .with_header("X-Purge-All", "true"),
        )
        .await;

    assert_eq!(response.status, 200);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["purged"], 2500);

    assert!(counting.list_calls.load(Ordering::SeqCst) >= 3);
    let remaining = kv.list(None, 10_000).await.unwrap();
    assert!(remaining.keys.is_empty());
}

#[tokio::test]
async fn test_bypassed_path_goes_straight_to_origin() {
    let origin = MockOrigin::new(Canned::html("<html>cart</html>"));
    let kv = memory_store();
    let engine = build_engine(debug_config(), origin.clone(), kv.clone());

    let response = engine.handle(get("https://shop.test/checkout/cart")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("UNCACHEABLE"));
    assert!(response
        .headers
        .get("X-Kasumi-Claims")
        .is_some_and(|claims| claims.contains("bypass:")));
    assert_eq!(origin.request_count(), 1);
    assert!(kv.list(None, 100).await.unwrap().keys.is_empty());
}
