//! 缓存管理器集成测试
//!
//! 覆盖逐层查找、回填、写穿、降级和统计

use crate::common::*;
use ponto_cache::{CacheError, TierStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn test_cold_read_then_local_hit() {
    let cache = create_test_cache().await;
    let key = dashboard_key("7");

    assert!(cache.manager.get(&key, "dashboard").await.is_none());

    cache
        .manager
        .set(&key, &sample_dashboard(), "dashboard", None)
        .await;
    assert_eq!(
        cache.manager.get(&key, "dashboard").await,
        Some(sample_dashboard())
    );

    let stats = cache.manager.stats();
    assert_eq!(stats.per_tier.local.hits, 1);
    // 冷读在本地层和共享层各记一次未命中
    assert_eq!(stats.per_tier.local.misses, 1);
    assert_eq!(stats.per_tier.shared.misses, 1);
    // dashboard 不落盘
    assert_eq!(stats.per_tier.persistent.misses, 0);
    assert_eq!(stats.per_tier.local.sets, 1);
    assert_eq!(stats.per_tier.shared.sets, 1);
    assert_eq!(stats.per_tier.persistent.sets, 0);
}

#[tokio::test]
async fn test_shared_hit_is_promoted_to_local() {
    let cache = create_test_cache().await;
    let key = dashboard_key("1");
    cache
        .manager
        .set(&key, &sample_dashboard(), "dashboard", None)
        .await;

    // 模拟另一个实例写入：本地层没有
    cache.manager.local().remove(&key);
    assert!(!cache.manager.local().contains(&key));

    assert_eq!(
        cache.manager.get(&key, "dashboard").await,
        Some(sample_dashboard())
    );
    assert!(cache.manager.local().contains(&key));

    let stats = cache.manager.stats();
    assert_eq!(stats.per_tier.shared.hits, 1);

    // 紧接着的读取命中本地层
    cache.manager.get(&key, "dashboard").await;
    assert_eq!(cache.manager.stats().per_tier.local.hits, 1);
}

#[tokio::test]
async fn test_persistent_hit_is_promoted_to_all_tiers() {
    let cache = create_test_cache().await;
    let key = "reports_GET_/api/reports/monthly_abc";
    let report = sample_report(20);
    cache.manager.set(key, &report, "reports", None).await;

    cache.manager.local().remove(key);
    cache.shared.delete(key).await.unwrap();

    assert_eq!(cache.manager.get(key, "reports").await, Some(report));
    assert!(cache.manager.local().contains(key));
    assert!(cache.shared.get(key).await.unwrap().is_some());

    let stats = cache.manager.stats();
    assert_eq!(stats.per_tier.persistent.hits, 1);
    assert_eq!(stats.per_tier.local.misses, 1);
    assert_eq!(stats.per_tier.shared.misses, 1);
}

#[tokio::test]
async fn test_persistent_tier_only_for_persistent_categories() {
    let cache = create_test_cache().await;
    cache
        .manager
        .set("static_GET_/logo_1", &json!("logo"), "static", None)
        .await;
    cache
        .manager
        .set("auth_GET_/me_1", &json!({"id": 1}), "auth", None)
        .await;

    let keys = cache.manager.persistent().keys(None).await.unwrap();
    assert_eq!(keys, vec!["static_GET_/logo_1".to_string()]);
}

#[tokio::test]
async fn test_shared_degradation_is_transparent() {
    let cache = create_test_cache().await;
    cache.shared.set_available(false);
    let key = dashboard_key("9");

    cache
        .manager
        .set(&key, &sample_dashboard(), "dashboard", None)
        .await;
    assert!(cache.shared.is_empty());
    assert_eq!(
        cache.manager.get(&key, "dashboard").await,
        Some(sample_dashboard())
    );

    let stats = cache.manager.stats();
    assert!(!stats.shared_connected);
    assert_eq!(stats.per_tier.shared.sets, 0);

    // 恢复后重新写入共享层
    cache.shared.set_available(true);
    cache
        .manager
        .set(&key, &sample_dashboard(), "dashboard", None)
        .await;
    assert_eq!(cache.shared.len(), 1);
    assert!(cache.manager.stats().shared_connected);
}

#[tokio::test]
async fn test_degraded_shared_tier_is_not_probed() {
    let cache = create_test_cache().await;
    cache.shared.set_available(false);

    assert!(cache.manager.get("missing", "dashboard").await.is_none());
    let stats = cache.manager.stats();
    assert_eq!(stats.per_tier.local.misses, 1);
    assert_eq!(stats.per_tier.shared.misses, 0);
}

#[tokio::test]
async fn test_ttl_expiry() {
    let cache = create_test_cache().await;
    let key = dashboard_key("ttl");
    cache
        .manager
        .set(
            &key,
            &sample_dashboard(),
            "dashboard",
            Some(Duration::from_millis(50)),
        )
        .await;
    assert!(cache.manager.get(&key, "dashboard").await.is_some());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.manager.get(&key, "dashboard").await.is_none());
}

#[tokio::test]
async fn test_category_ttl_is_applied() {
    let cache = create_test_cache().await;
    let key = dashboard_key("ttl2");
    cache
        .manager
        .set(&key, &sample_dashboard(), "dashboard", None)
        .await;

    let remaining = cache.manager.local().ttl_remaining(&key).unwrap();
    assert!(remaining <= Duration::from_secs(60));
    assert!(remaining > Duration::from_secs(55));
}

#[tokio::test]
async fn test_unknown_category_uses_default_policy() {
    let cache = create_test_cache().await;
    assert_eq!(
        cache.manager.policy("nao-existe"),
        cache.manager.policy("queries")
    );

    cache
        .manager
        .set("custom_1", &json!([1, 2, 3]), "nao-existe", None)
        .await;
    assert_eq!(
        cache.manager.get("custom_1", "nao-existe").await,
        Some(json!([1, 2, 3]))
    );
}

#[tokio::test]
async fn test_default_ttl_drives_unknown_categories() {
    let cache = create_test_cache_with(|mut config| {
        config.default_ttl_secs = 30;
        config
    })
    .await;
    cache
        .manager
        .set("custom_ttl", &json!({"v": 1}), "nao-existe", None)
        .await;

    let remaining = cache.manager.local().ttl_remaining("custom_ttl").unwrap();
    assert!(remaining <= Duration::from_secs(30));
    assert!(remaining > Duration::from_secs(25));
}

#[tokio::test]
async fn test_compression_is_transparent() {
    let cache = create_test_cache().await;
    let report = sample_report(200);
    cache.manager.set("reports_big", &report, "reports", None).await;

    let stored = cache.shared.get("reports_big").await.unwrap().unwrap();
    assert!(ponto_cache::codec::is_compressed(&stored));
    assert_eq!(cache.manager.get("reports_big", "reports").await, Some(report));

    let stats = cache.manager.stats();
    assert!(stats.compression_ratio > 0.0);
    assert!(stats.compression_ratio < 1.0);
    assert!(stats.total_bytes > 0);
}

#[tokio::test]
async fn test_get_or_compute_runs_loader_once() {
    let cache = create_test_cache().await;
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    for _ in 0..3 {
        let value = cache
            .manager
            .get_or_compute("queries_GET_/api/x_1", "queries", None, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<Value, CacheError>(json!({"computed": true}))
            })
            .await
            .unwrap();
        assert_eq!(value, json!({"computed": true}));
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_or_compute_error_is_not_cached() {
    let cache = create_test_cache().await;

    let result = cache
        .manager
        .get_or_compute("queries_fail", "queries", None, || async {
            Err::<Value, _>("database down")
        })
        .await;
    assert_eq!(result, Err("database down"));
    assert!(cache.manager.get("queries_fail", "queries").await.is_none());
}

#[tokio::test]
async fn test_delete_removes_from_all_tiers() {
    let cache = create_test_cache().await;
    let key = "reports_GET_/api/r_1";
    cache.manager.set(key, &sample_report(3), "reports", None).await;

    cache.manager.delete(key).await;

    assert!(!cache.manager.local().contains(key));
    assert!(cache.shared.get(key).await.unwrap().is_none());
    assert!(cache.manager.persistent().read(key).await.unwrap().is_none());
    assert!(cache.manager.get(key, "reports").await.is_none());
}

#[tokio::test]
async fn test_hit_rate_and_reset_metrics() {
    let cache = create_test_cache().await;
    cache.shared.set_available(false);
    let key = dashboard_key("rate");

    cache.manager.get(&key, "dashboard").await;
    cache
        .manager
        .set(&key, &sample_dashboard(), "dashboard", None)
        .await;
    cache.manager.get(&key, "dashboard").await;
    cache.manager.get(&key, "dashboard").await;
    cache.manager.get(&key, "dashboard").await;

    // 3次命中，1次未命中
    assert_eq!(cache.manager.stats().hit_rate_percent, 75);

    cache.manager.reset_metrics();
    let stats = cache.manager.stats();
    assert_eq!(stats.hit_rate_percent, 0);
    assert_eq!(stats.per_tier.local.hits, 0);
    assert_eq!(stats.total_bytes, 0);
    // 使用模式不受影响
    assert_eq!(stats.tracked_patterns, 1);
}

#[tokio::test]
async fn test_local_capacity_evicts_oldest_write() {
    let cache = create_test_cache_with(|config| config.local_capacity(2)).await;
    cache.shared.set_available(false);

    cache.manager.set("a", &json!(1), "auth", None).await;
    cache.manager.set("b", &json!(2), "auth", None).await;
    // 读取不改变淘汰顺序
    cache.manager.get("a", "auth").await;
    cache.manager.set("c", &json!(3), "auth", None).await;

    assert!(!cache.manager.local().contains("a"));
    assert!(cache.manager.local().contains("b"));
    assert!(cache.manager.local().contains("c"));
    assert_eq!(cache.manager.stats().local_keys, 2);
}

#[tokio::test]
async fn test_manager_without_shared_tier() {
    let dir = tempfile::tempdir().unwrap();
    let manager = create_local_only_cache(&dir).await;
    assert!(!manager.has_shared());

    manager.set("static_x", &json!("x"), "static", None).await;
    manager.local().remove("static_x");
    assert_eq!(manager.get("static_x", "static").await, Some(json!("x")));
    assert!(!manager.stats().shared_connected);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir).shared(ponto_cache::SharedConfig::new("http://nope"));

    let result = ponto_cache::CacheManager::new(config).await;
    assert!(matches!(result, Err(CacheError::Config(_))));
}
