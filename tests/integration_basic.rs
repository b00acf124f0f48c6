//! Basic integration tests for L1 and L2 cache operations
//!
//! The remote tier is the in-process fault-injecting backend from `common`.

mod common;

use bytes::Bytes;
use common::*;
use std::time::Duration;
use tiered_cache::{CacheError, RemoteBackend, TtlOptions};

/// Test basic cache set and get operations
#[tokio::test]
async fn test_basic_set_and_get() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;

    cache
        .cache_manager()
        .set(
            "article:1",
            Bytes::from_static(b"A"),
            TtlOptions::explicit(Duration::from_secs(300), Duration::from_secs(3600)),
        )
        .await
        .unwrap();

    let cached = cache.cache_manager().get("article:1").await;
    assert_eq!(cached, Some(Bytes::from_static(b"A")));

    // Both tiers hold their own copy
    assert_eq!(backend.sets(), 1);
    assert_eq!(
        backend.store().get("article:1").await.unwrap(),
        Some(b"A".to_vec())
    );
    assert_eq!(backend.gets(), 0, "L1 hit must not reach L2");
}

/// Test cache miss behavior
#[tokio::test]
async fn test_cache_miss() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;

    assert_eq!(cache.cache_manager().get("missing:key").await, None);

    assert_cache_stats!(cache, misses == 1);
    assert_cache_stats!(cache, l2_read_errors == 0);
}

/// Test L2-to-L1 promotion
#[tokio::test]
async fn test_l2_to_l1_promotion() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let key = test_key("article");

    // Set directly in L2 (bypass L1)
    backend
        .store()
        .set_with_ttl(&key, b"from-l2", Duration::from_secs(300))
        .await
        .unwrap();

    let first = cache.cache_manager().get(&key).await;
    let second = cache.cache_manager().get(&key).await;
    assert_eq!(first, Some(Bytes::from_static(b"from-l2")));
    assert_eq!(second, first);

    assert_eq!(backend.gets(), 1, "Promoted key must not need a second L2 round trip");
    assert_cache_stats!(cache, promotions == 1);
    assert_cache_stats!(cache, l1_hits == 1);
    assert_cache_stats!(cache, l2_hits == 1);
}

/// Entries are absent once their TTL elapses in both tiers
#[tokio::test]
async fn test_ttl_expiration() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let key = test_key("article");

    cache
        .cache_manager()
        .set(&key, b"short-lived".to_vec(), TtlOptions::uniform(Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(cache.cache_manager().get(&key).await.is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cache.cache_manager().get(&key).await, None);
}

/// L1 can expire before L2: the next read is served by L2 and re-promoted
#[tokio::test]
async fn test_short_l1_ttl_falls_back_to_l2() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let key = test_key("article");

    cache
        .cache_manager()
        .set(
            &key,
            b"v".to_vec(),
            TtlOptions::explicit(Duration::from_millis(30), Duration::from_secs(60)),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(cache.cache_manager().get(&key).await, Some(Bytes::from_static(b"v")));
    assert_eq!(backend.gets(), 1);
    assert_cache_stats!(cache, l2_hits == 1);
}

/// A promoted copy expires together with the L2 entry it was read from
#[tokio::test]
async fn test_promoted_value_expires_with_l2_entry() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let manager = cache.cache_manager();
    let key = test_key("article");

    manager
        .set(
            &key,
            b"A".to_vec(),
            TtlOptions::explicit(Duration::from_millis(30), Duration::from_millis(200)),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // L1 copy gone, served from L2 and promoted
    assert_eq!(manager.get(&key).await, Some(Bytes::from_static(b"A")));
    assert_cache_stats!(cache, promotions == 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.get(&key).await, None, "value outlived every TTL given to set");
}

/// L1 admission rejection is not an error; the value is still served from L2
#[tokio::test]
async fn test_oversized_value_lives_in_l2_only() {
    let backend = FaultyBackend::new();
    let mut config = fast_config();
    config.l1.max_cost_bytes = 1024;
    let cache = tiered_cache::CacheSystemBuilder::new()
        .with_config(config)
        .with_remote_backend(backend.clone())
        .without_health_monitor()
        .build()
        .await
        .unwrap();

    let key = test_key("article");
    let large = vec![7u8; 4096];
    cache
        .cache_manager()
        .set(&key, large.clone(), TtlOptions::heuristic())
        .await
        .unwrap();

    assert_eq!(cache.cache_manager().get(&key).await, Some(Bytes::from(large)));
    assert_eq!(backend.gets(), 1);
    assert_eq!(cache.cache_manager().l1().stats().rejections, 2);
}

/// Test type-safe caching through the JSON adapter
#[tokio::test]
async fn test_type_safe_caching() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let manager = cache.cache_manager();

    let article = test_data::Article::new(42);
    manager
        .set_typed("article:42", &article, TtlOptions::heuristic())
        .await
        .unwrap();

    let cached: Option<test_data::Article> = manager.get_typed("article:42").await.unwrap();
    assert_eq!(cached, Some(article));

    // A value of another shape fails for this call only
    let wrong: Result<Option<test_data::Category>, _> = manager.get_typed("article:42").await;
    assert!(matches!(wrong, Err(CacheError::Serialization(_))));
    assert!(manager.get_typed::<test_data::Article>("article:42").await.is_ok());
}

/// Test compute-on-miss populates both tiers
#[tokio::test]
async fn test_compute_on_miss() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let manager = cache.cache_manager();
    let key = test_key("category");

    let category = manager
        .get_or_compute_typed(&key, TtlOptions::heuristic(), || async {
            Ok(test_data::Category::new(3))
        })
        .await
        .unwrap();
    assert_eq!(category, test_data::Category::new(3));
    assert_eq!(backend.sets(), 1);

    let again: test_data::Category = manager
        .get_or_compute_typed(&key, TtlOptions::heuristic(), || async {
            Err(CacheError::Config("should be cached".into()))
        })
        .await
        .unwrap();
    assert_eq!(again, category);
}

/// Compute errors reach the caller and nothing is cached
#[tokio::test]
async fn test_compute_error_is_returned() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let key = test_key("article");

    let result: Result<test_data::Article, _> = cache
        .cache_manager()
        .get_or_compute_typed(&key, TtlOptions::heuristic(), || async {
            Err(CacheError::connection("origin", "database unavailable"))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(backend.sets(), 0);
}

/// Test statistics tracking
#[tokio::test]
async fn test_statistics_tracking() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let manager = cache.cache_manager();

    manager.set("article:10", b"x".to_vec(), TtlOptions::heuristic()).await.unwrap();
    backend
        .store()
        .set_with_ttl("article:11", b"y", Duration::from_secs(60))
        .await
        .unwrap();

    manager.get("article:10").await; // L1 hit
    manager.get("article:11").await; // L2 hit
    manager.get("article:12").await; // miss

    let stats = manager.stats();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.l1_hits, 1);
    assert_eq!(stats.l2_hits, 1);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
}

/// Concurrent writers are not coordinated across tiers: L1 and L2 may end up
/// holding different values for the same key until one of them expires.
#[tokio::test]
async fn test_tiers_may_disagree_after_concurrent_writes() {
    let backend = FaultyBackend::new();
    let cache = setup_cache_system(&backend).await;
    let manager = cache.cache_manager().clone();
    let key = test_key("article");

    // Writer A reaches L1 first, writer B overtakes it at L2
    backend.set_delay(Duration::from_millis(80));
    let slow_writer = {
        let manager = manager.clone();
        let key = key.clone();
        tokio::spawn(async move { manager.set(&key, b"A".to_vec(), TtlOptions::heuristic()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    backend.set_delay(Duration::ZERO);
    manager.set(&key, b"B".to_vec(), TtlOptions::heuristic()).await.unwrap();
    slow_writer.await.unwrap().unwrap();

    // L1 saw A then B; L2 saw B then A
    assert_eq!(manager.get(&key).await, Some(Bytes::from_static(b"B")));
    assert_eq!(backend.store().get(&key).await.unwrap(), Some(b"A".to_vec()));

    // Once L1 is dropped, readers see L2's value
    manager.clear_l1();
    assert_eq!(manager.get(&key).await, Some(Bytes::from_static(b"A")));
}
