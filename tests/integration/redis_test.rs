//! Redis集成测试
//!
//! 测试Redis共享层的集成功能

use ponto_cache::{CacheConfig, CacheManager, RedisConfig, RedisStore, SharedConfig, TierStore};
use serde_json::json;
use std::time::Duration;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// 测试Redis连接
#[tokio::test]
#[ignore] // 需要Redis服务器运行
async fn test_redis_store_basic_operations() {
    let store = RedisStore::new(RedisConfig::new(redis_url()).db(15))
        .await
        .unwrap();
    assert!(store.is_available());

    store
        .set("ponto_test_k1", b"v1", Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(
        store.get("ponto_test_k1").await.unwrap(),
        Some(b"v1".to_vec())
    );

    let keys = store.list_keys(Some("ponto_test_")).await.unwrap();
    assert!(keys.contains(&"ponto_test_k1".to_string()));

    store.delete("ponto_test_k1").await.unwrap();
    assert_eq!(store.get("ponto_test_k1").await.unwrap(), None);
    store.shutdown();
}

/// 测试Redis的TTL
#[tokio::test]
#[ignore]
async fn test_redis_store_ttl() {
    let store = RedisStore::new(RedisConfig::new(redis_url()).db(15))
        .await
        .unwrap();
    store
        .set("ponto_test_ttl", b"v", Duration::from_millis(100))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(store.get("ponto_test_ttl").await.unwrap(), None);
    store.shutdown();
}

/// 测试两个管理器通过Redis共享数据
#[tokio::test]
#[ignore]
async fn test_two_managers_share_entries() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let shared = SharedConfig {
        db: 15,
        ..SharedConfig::new(redis_url())
    };

    let a = CacheManager::new(
        CacheConfig::default()
            .cache_dir(dir_a.path())
            .shared(shared.clone()),
    )
    .await
    .unwrap();
    let b = CacheManager::new(CacheConfig::default().cache_dir(dir_b.path()).shared(shared))
        .await
        .unwrap();

    a.set("auth_GET_/me_shared", &json!({"id": 5}), "auth", None)
        .await;
    assert_eq!(
        b.get("auth_GET_/me_shared", "auth").await,
        Some(json!({"id": 5}))
    );
    assert_eq!(b.stats().per_tier.shared.hits, 1);

    a.delete("auth_GET_/me_shared").await;
    a.shutdown().await;
    b.shutdown().await;
}

/// 无法连接时以降级状态启动
#[tokio::test]
async fn test_unreachable_redis_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let shared = SharedConfig {
        connection_timeout_ms: 200,
        ..SharedConfig::new("redis://127.0.0.1:1")
    };
    let manager = CacheManager::new(CacheConfig::default().cache_dir(dir.path()).shared(shared))
        .await
        .unwrap();

    assert!(manager.has_shared());
    assert!(!manager.stats().shared_connected);

    manager.set("auth_x", &json!(1), "auth", None).await;
    assert_eq!(manager.get("auth_x", "auth").await, Some(json!(1)));
    manager.shutdown().await;
}
