// Streaming tee: the client reads the origin stream while the record is
// captured in the background

use super::test_harness::*;
use kasumi::cache::CacheRecord;
use kasumi::config::Config;
use kasumi::constants::CACHE_STATUS_HEADER;
use kasumi::response::ResponseBody;

const PAGE_KEY: &str = "fpc:shop.test/women.html::device:desktop";

fn streaming_config() -> Config {
    let mut config = Config::default();
    config.cache.streaming = true;
    config
}

#[tokio::test]
async fn test_streamed_miss_is_stored_after_drain() {
    let origin = MockOrigin::new(Canned::html("<html>streamed page</html>"));
    let engine = build_engine(streaming_config(), origin.clone(), memory_store());

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("MISS"));
    assert!(matches!(response.body, ResponseBody::Stream(_)));
    assert_eq!(body_string(response).await, "<html>streamed page</html>");

    engine.tasks().drain().await;
    match engine.store().get(PAGE_KEY).await.unwrap() {
        Some(CacheRecord::Cache(cached)) => assert_eq!(cached.body, "<html>streamed page</html>"),
        other => panic!("expected captured record, got {:?}", other),
    }

    let hit = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(hit.headers.get(CACHE_STATUS_HEADER), Some("HIT"));
    assert_eq!(origin.request_count(), 1);
}

#[tokio::test]
async fn test_abandoned_client_does_not_stop_capture() {
    let origin = MockOrigin::new(Canned::html("<html>nobody read me</html>"));
    let engine = build_engine(streaming_config(), origin.clone(), memory_store());

    let response = engine.handle(get("https://shop.test/women.html")).await;
    drop(response);

    engine.tasks().drain().await;
    assert!(matches!(
        engine.store().get(PAGE_KEY).await.unwrap(),
        Some(CacheRecord::Cache(_))
    ));
}

#[tokio::test]
async fn test_streamed_tiny_body_is_not_stored() {
    let origin = MockOrigin::new(Canned::html("ok"));
    let engine = build_engine(streaming_config(), origin.clone(), memory_store());

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(body_string(response).await, "ok");

    engine.tasks().drain().await;
    assert!(engine.store().get(PAGE_KEY).await.unwrap().is_none());
}
