// Embedder plugins running through the engine

use super::test_harness::*;
use kasumi::config::Config;
use kasumi::constants::CACHE_STATUS_HEADER;

#[tokio::test]
async fn test_origin_request_carries_every_plugin_stamp_in_order() {
    let origin = MockOrigin::new(Canned::html("<html>women</html>"));
    let engine = build_engine(Config::default(), origin.clone(), memory_store())
        .with_plugin(StampPlugin::new("first"))
        .with_plugin(StampPlugin::new("second"));

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("MISS"));

    let requests = origin.requests();
    assert_eq!(requests.len(), 1);
    let stamps: Vec<&str> = requests[0].headers.get_all("X-Edge-Stamp").collect();
    assert_eq!(stamps, vec!["first", "second"]);
}

#[tokio::test]
async fn test_background_refresh_is_stamped_too() {
    let origin = MockOrigin::new(Canned::html("<html>fresh</html>"));
    let engine = build_engine(Config::default(), origin.clone(), memory_store())
        .with_plugin(StampPlugin::new("edge"));

    let seeded = record("<html>old</html>", -1_000, 600_000, &[("Content-Type", "text/html")]);
    engine
        .store()
        .put("fpc:shop.test/women.html::device:desktop", &seeded, kasumi::cache::now_millis())
        .await
        .unwrap();

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("STALE"));
    engine.tasks().drain().await;

    let requests = origin.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].headers.get("X-Edge-Stamp"), Some("edge"));
}

#[tokio::test]
async fn test_plugin_answer_short_circuits_the_engine() {
    let origin = MockOrigin::new(Canned::html("<html>never fetched</html>"));
    let answering = StampPlugin::answering("answering", Some("/robots.txt"));
    let later = StampPlugin::new("later");
    let engine = build_engine(Config::default(), origin.clone(), memory_store())
        .with_plugin(answering.clone())
        .with_plugin(later.clone());

    let response = engine.handle(get("https://shop.test/robots.txt")).await;
    assert_eq!(response.status, 204);
    assert_eq!(response.headers.get("X-Answered-By"), Some("answering"));
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), None);

    assert_eq!(origin.request_count(), 0);
    assert_eq!(answering.on_request_calls(), 1);
    assert_eq!(later.on_request_calls(), 0);
    assert!(engine
        .store()
        .get("fpc:shop.test/robots.txt::device:desktop")
        .await
        .unwrap()
        .is_none());

    // Other paths fall through both plugins to the origin
    engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(origin.request_count(), 1);
    assert_eq!(answering.on_request_calls(), 2);
    assert_eq!(later.on_request_calls(), 1);
}
