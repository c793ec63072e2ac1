// Cache-hit validation by the asset guard

use super::test_harness::*;
use kasumi::cache::{now_millis, CacheRecord};
use kasumi::config::Config;
use kasumi::constants::{CACHE_STATUS_HEADER, GRACE_HEADER};

const PAGE_KEY: &str = "fpc:shop.test/women.html::device:desktop";
const STYLESHEET: &str = "/static/version1700000000/_cache/merged/0a1b2c3d.min.css";

fn guarded_config() -> Config {
    let mut config = Config::default();
    config.plugins.asset_guard.enabled = true;
    config
}

fn page() -> String {
    format!(r#"<html><head><link rel="stylesheet" href="{}"></head></html>"#, STYLESHEET)
}

#[tokio::test]
async fn test_hit_with_missing_stylesheet_is_refetched() {
    let origin = MockOrigin::new(Canned::html(&page()));
    let prober = MockProber::new();
    prober.mark_missing(&format!("https://shop.test{}", STYLESHEET));
    let engine = build_engine_with_prober(guarded_config(), origin.clone(), memory_store(), prober.clone());

    let seeded = record(&page(), 60_000, 60_000, &[("Content-Type", "text/html")]);
    engine.store().put(PAGE_KEY, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("MISS"));
    assert_eq!(origin.request_count(), 1);

    // The refetched page still links the missing stylesheet
    assert!(matches!(
        engine.store().get(PAGE_KEY).await.unwrap(),
        Some(CacheRecord::Pass { .. })
    ));

    // One probe, memoized for the fetch-time check
    assert_eq!(prober.probe_count(), 1);
}

#[tokio::test]
async fn test_rejected_stale_record_is_refetched_inline() {
    let origin = MockOrigin::new(Canned::html("<html>replacement</html>"));
    let prober = MockProber::new();
    prober.mark_missing(&format!("https://shop.test{}", STYLESHEET));
    let engine = build_engine_with_prober(guarded_config(), origin.clone(), memory_store(), prober.clone());

    let seeded = record(&page(), -1_000, 600_000, &[("Content-Type", "text/html")]);
    engine.store().put(PAGE_KEY, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("MISS"));
    assert_eq!(response.headers.get(GRACE_HEADER), None);
    assert_eq!(body_string(response).await, "<html>replacement</html>");

    // Fetched once, in the foreground; nothing left to revalidate
    assert_eq!(origin.request_count(), 1);
    assert!(engine.tasks().is_empty());

    match engine.store().get(PAGE_KEY).await.unwrap() {
        Some(CacheRecord::Cache(cached)) => assert_eq!(cached.body, "<html>replacement</html>"),
        other => panic!("expected replacement record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hit_with_present_stylesheet_is_served() {
    let origin = MockOrigin::new(Canned::html("unused"));
    let prober = MockProber::new();
    let engine = build_engine_with_prober(guarded_config(), origin.clone(), memory_store(), prober.clone());

    let seeded = record(&page(), 60_000, 60_000, &[("Content-Type", "text/html")]);
    engine.store().put(PAGE_KEY, &seeded, now_millis()).await.unwrap();

    let first = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(first.headers.get(CACHE_STATUS_HEADER), Some("HIT"));
    let second = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(second.headers.get(CACHE_STATUS_HEADER), Some("HIT"));

    assert_eq!(origin.request_count(), 0);
    assert_eq!(prober.probe_count(), 1);
}

#[tokio::test]
async fn test_non_html_hits_are_not_probed() {
    let origin = MockOrigin::new(Canned::html("unused"));
    let prober = MockProber::new();
    prober.mark_missing(&format!("https://shop.test{}", STYLESHEET));
    let engine = build_engine_with_prober(guarded_config(), origin.clone(), memory_store(), prober.clone());

    let seeded = record(&page(), 60_000, 60_000, &[("Content-Type", "application/json")]);
    engine.store().put(PAGE_KEY, &seeded, now_millis()).await.unwrap();

    let response = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(response.headers.get(CACHE_STATUS_HEADER), Some("HIT"));
    assert_eq!(prober.probe_count(), 0);
}
