//! 缓存层集成测试
//!
//! 各层通过 `TierStore` 接口的行为，以及损坏数据的处理

use crate::common::*;
use ponto_cache::{LocalStore, MemoryStore, PersistentStore, Tier, TierStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn exercise_contract(store: &dyn TierStore) {
    store
        .set("k1", br#"{"a":1}"#, Duration::from_secs(60))
        .await
        .unwrap();
    store
        .set("other", br#"2"#, Duration::from_secs(60))
        .await
        .unwrap();

    assert!(store.get("k1").await.unwrap().is_some());
    assert_eq!(store.get("missing").await.unwrap(), None);
    assert_eq!(
        store.list_keys(Some("k")).await.unwrap(),
        vec!["k1".to_string()]
    );

    store.delete("k1").await.unwrap();
    assert_eq!(store.get("k1").await.unwrap(), None);
    // 删除不存在的键不报错
    store.delete("k1").await.unwrap();

    store.clear().await.unwrap();
    assert!(store.list_keys(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_all_tiers_share_the_contract() {
    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::new(10);
    let shared = MemoryStore::new();
    let persistent = PersistentStore::new(dir.path()).await.unwrap();

    exercise_contract(&local).await;
    exercise_contract(&shared).await;
    exercise_contract(&persistent).await;

    assert_eq!(local.tier(), Tier::Local);
    assert_eq!(shared.tier(), Tier::Shared);
    assert_eq!(persistent.tier(), Tier::Persistent);
}

#[tokio::test]
async fn test_corrupt_shared_entry_is_a_miss_and_deleted() {
    let cache = create_test_cache().await;
    cache
        .shared
        .set("auth_bad", b"\x1f\x8bgarbage", Duration::from_secs(60))
        .await
        .unwrap();

    assert!(cache.manager.get("auth_bad", "auth").await.is_none());
    assert!(cache.shared.get("auth_bad").await.unwrap().is_none());
    assert_eq!(cache.manager.stats().per_tier.shared.misses, 1);
}

#[tokio::test]
async fn test_corrupt_persistent_file_is_a_miss() {
    let cache = create_test_cache().await;
    let file = cache
        .cache_dir()
        .join(ponto_cache::disk_store::encode_file_name("static_bad"));
    tokio::fs::write(&file, b"not a record").await.unwrap();

    assert!(cache.manager.get("static_bad", "static").await.is_none());
    assert!(!file.exists());
}

#[tokio::test]
async fn test_persistent_files_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let manager = create_local_only_cache(&dir).await;
        manager
            .set("reports_GET_/mensal_h", &sample_report(5), "reports", None)
            .await;
        manager.shutdown().await;
    }

    let manager = create_local_only_cache(&dir).await;
    assert_eq!(
        manager.get("reports_GET_/mensal_h", "reports").await,
        Some(sample_report(5))
    );
    assert_eq!(manager.stats().per_tier.persistent.hits, 1);
}

#[tokio::test]
async fn test_file_names_are_reversible() {
    let dir = tempfile::tempdir().unwrap();
    let store = PersistentStore::new(dir.path()).await.unwrap();
    let key = "queries_GET_/api/colaboradores?page=1&x=ä_h";
    store.write(key, &json!(1), Duration::from_secs(60)).await.unwrap();

    assert_eq!(store.keys(None).await.unwrap(), vec![key.to_string()]);
    assert_eq!(store.read(key).await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn test_custom_shared_tier_via_builder() {
    let dir = tempfile::tempdir().unwrap();
    let shared = Arc::new(MemoryStore::new());
    let manager = ponto_cache::CacheManager::builder(test_config(&dir))
        .shared_store(shared.clone())
        .build()
        .await
        .unwrap();

    manager.set("auth_x", &json!({"ok": true}), "auth", None).await;
    assert_eq!(shared.len(), 1);
    assert!(manager.has_shared());
}

#[tokio::test]
async fn test_hung_shared_tier_is_bounded_by_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let manager = create_delayed_cache(&dir, Duration::from_secs(3600), |config| {
        config.shared_timeout(Duration::from_millis(100))
    })
    .await;
    let key = "reports_GET_/api/reports/anual_h";
    let report = sample_report(5);

    let start = std::time::Instant::now();
    manager.set(key, &report, "reports", None).await;
    assert!(start.elapsed() < Duration::from_secs(1));

    // 共享层挂起时仍从持久层读到值
    manager.local().remove(key);
    let start = std::time::Instant::now();
    assert_eq!(manager.get(key, "reports").await, Some(report));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(manager.local().contains(key));
}
