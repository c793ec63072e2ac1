// Redis backend against a real server (requires Docker)

use super::test_harness::*;
use kasumi::cache::{now_millis, CacheRecord, KvStore, RedisConfig, RedisStore};
use kasumi::config::Config;
use kasumi::constants::CACHE_STATUS_HEADER;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{clients::Cli, RunnableImage};
use testcontainers_modules::redis::Redis;

fn redis_store(port: u16, prefix: &str) -> RedisStore {
    let config = RedisConfig {
        redis_url: Some(format!("redis://127.0.0.1:{}", port)),
        redis_key_prefix: prefix.to_string(),
        ..Default::default()
    };
    RedisStore::new(config).expect("redis store should build")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_put_get_list_delete() {
    let docker = Cli::default();
    let container = docker.run(RunnableImage::from(Redis::default()));
    let port = container.get_host_port_ipv4(6379);
    let store = redis_store(port, "kasumi-test:");

    for i in 0..25 {
        store
            .put(&format!("fpc:page{:02}", i), format!("v{}", i), Duration::from_secs(60))
            .await
            .unwrap();
    }
    assert_eq!(store.get("fpc:page07").await.unwrap().as_deref(), Some("v7"));
    assert!(store.get("fpc:absent").await.unwrap().is_none());

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store.list(cursor.as_deref(), 10).await.unwrap();
        seen.extend(page.keys);
        if page.complete {
            break;
        }
        cursor = page.next_cursor;
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 25);
    assert!(seen.iter().all(|k| k.starts_with("fpc:page")));

    store.delete("fpc:page07").await.unwrap();
    assert!(store.get("fpc:page07").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_engine_hits_from_redis() {
    let docker = Cli::default();
    let container = docker.run(RunnableImage::from(Redis::default()));
    let port = container.get_host_port_ipv4(6379);
    let kv: Arc<dyn KvStore> = Arc::new(redis_store(port, "kasumi-e2e:"));

    let origin = MockOrigin::new(Canned::html("<html>from redis</html>"));
    let engine = build_engine(Config::default(), origin.clone(), kv);

    let miss = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(miss.headers.get(CACHE_STATUS_HEADER), Some("MISS"));

    let hit = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(hit.headers.get(CACHE_STATUS_HEADER), Some("HIT"));
    assert_eq!(body_string(hit).await, "<html>from redis</html>");
    assert_eq!(origin.request_count(), 1);

    let pass = CacheRecord::hit_for_pass(now_millis(), Duration::from_secs(120));
    engine
        .store()
        .put("fpc:shop.test/women.html::device:desktop", &pass, now_millis())
        .await
        .unwrap();
    let bypassed = engine.handle(get("https://shop.test/women.html")).await;
    assert_eq!(bypassed.headers.get(CACHE_STATUS_HEADER), Some("UNCACHEABLE"));
}
