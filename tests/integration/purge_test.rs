// Purge endpoint through the engine's front door

use super::test_harness::*;
use kasumi::cache::{now_millis, KvStore};
use kasumi::config::Config;
use kasumi::constants::CACHE_STATUS_HEADER;
use kasumi::pipeline::IncomingRequest;
use url::Url;

fn purge_config() -> Config {
    let mut config = Config::default();
    config.purge.enabled = true;
    config.purge.secret = "s3cr3t".to_string();
    config
}

fn post(url: &str) -> IncomingRequest {
    IncomingRequest::new("POST", Url::parse(url).unwrap())
}

#[tokio::test]
async fn test_purged_page_misses_again() {
    let origin = MockOrigin::new(Canned::html("<html>women</html>"));
    let engine = build_engine(purge_config(), origin.clone(), memory_store());

    engine.handle(get("https://shop.test/women.html")).await;
    let hit = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(hit.headers.get(CACHE_STATUS_HEADER), Some("HIT"));

    let purge = engine
        .handle(
            post("https://shop.test/__kasumi/purge")
                .with_header("X-Purge-Secret", "s3cr3t")
                .with_header("X-Purge-Url", "/women.html"),
        )
        .await;
    assert_eq!(purge.status, 200);

    let after = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(after.headers.get(CACHE_STATUS_HEADER), Some("MISS"));
    assert_eq!(origin.request_count(), 2);
}

#[tokio::test]
async fn test_purge_keys_follow_vary_cookies() {
    let origin = MockOrigin::new(Canned::html("<html>women</html>"));
    let engine = build_engine(purge_config(), origin.clone(), memory_store());

    let request = || get("https://shop.test/women.html").with_header("Cookie", "X-Magento-Vary=grp1");
    engine.handle(request()).await;

    let purge = engine
        .handle(
            post("https://shop.test/")
                .with_header("X-Purge-Secret", "s3cr3t")
                .with_header("X-Purge-Url", "https://shop.test/women.html")
                .with_header("Cookie", "X-Magento-Vary=grp1"),
        )
        .await;
    let body: serde_json::Value = serde_json::from_str(&body_string(purge).await).unwrap();
    let key = body["key"].as_str().unwrap().to_string();
    assert!(key.contains("::vary:grp1"));
    assert!(engine.store().get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unauthorized_purge_leaves_cache_alone() {
    let origin = MockOrigin::new(Canned::html("<html>women</html>"));
    let kv = memory_store();
    let engine = build_engine(purge_config(), origin.clone(), kv.clone());

    let key = "fpc:shop.test/women.html::device:desktop";
    let seeded = record("<html>women</html>", 60_000, 0, &[("Content-Type", "text/html")]);
    engine.store().put(key, &seeded, now_millis()).await.unwrap();

    let response = engine
        .handle(
            post("https://shop.test/__kasumi/purge")
                .with_header("X-Purge-Secret", "wrong")
                .with_header("X-Purge-All", "true"),
        )
        .await;
    assert_eq!(response.status, 401);
    assert!(kv.get(key).await.unwrap().is_some());
    assert_eq!(origin.request_count(), 0);
}

#[tokio::test]
async fn test_disabled_purge_is_an_ordinary_request() {
    let origin = MockOrigin::new(Canned::html("<html>origin answered</html>"));
    let engine = build_engine(Config::default(), origin.clone(), memory_store());

    let response = engine
        .handle(post("https://shop.test/__kasumi/purge").with_header("X-Purge-Secret", "s3cr3t"))
        .await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("UNCACHEABLE"));
    assert_eq!(origin.request_count(), 1);
}
