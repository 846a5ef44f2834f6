//! 失效集成测试
//!
//! 按表、分类、通配模式和全部清空

use crate::common::*;
use ponto_cache::{Invalidation, TierStore};
use serde_json::json;
use std::time::Duration;

async fn populate_reports_and_static(cache: &TestCache) {
    for i in 0..3 {
        cache
            .manager
            .set(
                &format!("reports_GET_/api/reports/{}_h", i),
                &sample_report(2),
                "reports",
                None,
            )
            .await;
    }
    for i in 0..2 {
        cache
            .manager
            .set(
                &format!("static_GET_/assets/{}_h", i),
                &json!({"asset": i}),
                "static",
                None,
            )
            .await;
    }
}

#[tokio::test]
async fn test_cascading_table_invalidation() {
    let cache = create_test_cache().await;
    populate_reports_and_static(&cache).await;

    let removed = cache
        .manager
        .invalidate(Invalidation::table("registros_ponto"))
        .await;
    assert_eq!(removed, 3);

    for i in 0..3 {
        let key = format!("reports_GET_/api/reports/{}_h", i);
        assert!(cache.manager.get(&key, "reports").await.is_none());
        // 持久层也已删除
        assert!(cache.manager.persistent().read(&key).await.unwrap().is_none());
    }
    for i in 0..2 {
        let key = format!("static_GET_/assets/{}_h", i);
        assert!(cache.manager.get(&key, "static").await.is_some());
    }
}

#[tokio::test]
async fn test_category_cascade_leaves_unrelated_categories() {
    let cache = create_test_cache_with(with_order_categories).await;
    for i in 0..4 {
        cache
            .manager
            .set(&format!("orders_{}", i), &json!({"order": i}), "orders", None)
            .await;
        cache
            .manager
            .set(&format!("users_{}", i), &json!({"user": i}), "users", None)
            .await;
    }

    assert_eq!(
        cache.manager.invalidate(Invalidation::table("orders")).await,
        4
    );

    for i in 0..4 {
        assert!(cache
            .manager
            .get(&format!("orders_{}", i), "orders")
            .await
            .is_none());
        assert!(cache
            .manager
            .get(&format!("users_{}", i), "users")
            .await
            .is_some());
    }
}

#[tokio::test]
async fn test_wildcard_category_cleared_by_any_table() {
    let cache = create_test_cache().await;
    cache
        .manager
        .set("queries_GET_/api/x_h", &json!([1]), "queries", None)
        .await;
    cache
        .manager
        .set("auth_GET_/me_h", &json!({"id": 1}), "auth", None)
        .await;

    assert_eq!(
        cache
            .manager
            .invalidate(Invalidation::table("tabela_qualquer"))
            .await,
        1
    );
    assert!(cache
        .manager
        .get("queries_GET_/api/x_h", "queries")
        .await
        .is_none());
    assert!(cache.manager.get("auth_GET_/me_h", "auth").await.is_some());
}

#[tokio::test]
async fn test_table_without_dependents_removes_nothing() {
    let cache = create_test_cache().await;
    cache
        .manager
        .set("static_GET_/a_h", &json!(1), "static", None)
        .await;

    // 只有 queries 依赖任意表，而它是空的
    assert_eq!(
        cache.manager.invalidate(Invalidation::table("outra")).await,
        0
    );
    assert!(cache.manager.local().contains("static_GET_/a_h"));
}

#[tokio::test]
async fn test_category_invalidation() {
    let cache = create_test_cache().await;
    populate_reports_and_static(&cache).await;

    assert_eq!(
        cache
            .manager
            .invalidate(Invalidation::category("static"))
            .await,
        2
    );
    assert!(cache.shared.list_keys(Some("static_")).await.unwrap().is_empty());
    assert_eq!(cache.shared.list_keys(Some("reports_")).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_pattern_invalidation_matches_whole_key() {
    let cache = create_test_cache().await;
    populate_reports_and_static(&cache).await;

    let removed = cache
        .manager
        .invalidate(Invalidation::pattern("reports_GET_/api/reports/1*"))
        .await;
    assert_eq!(removed, 1);
    assert!(!cache.manager.local().contains("reports_GET_/api/reports/1_h"));
    assert!(cache.manager.local().contains("reports_GET_/api/reports/0_h"));

    // 不以模式开头的键不会被匹配
    assert_eq!(
        cache
            .manager
            .invalidate(Invalidation::pattern("GET_*"))
            .await,
        0
    );
}

#[tokio::test]
async fn test_expired_keys_are_not_counted() {
    let cache = create_test_cache().await;
    cache
        .manager
        .set(
            "reports_old",
            &json!(1),
            "reports",
            Some(std::time::Duration::from_millis(20)),
        )
        .await;
    cache
        .manager
        .set("reports_new", &json!(2), "reports", None)
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;

    assert_eq!(
        cache
            .manager
            .invalidate(Invalidation::table("registros_ponto"))
            .await,
        1
    );
}

#[tokio::test]
async fn test_clear_flushes_every_tier() {
    let cache = create_test_cache().await;
    populate_reports_and_static(&cache).await;

    assert_eq!(cache.manager.clear().await, 5);

    assert_eq!(cache.manager.stats().local_keys, 0);
    assert!(cache.shared.is_empty());
    assert!(cache.manager.persistent().keys(None).await.unwrap().is_empty());
    assert_eq!(cache.manager.invalidate(Invalidation::All).await, 0);
}

#[tokio::test]
async fn test_invalidation_survives_shared_outage() {
    let cache = create_test_cache().await;
    populate_reports_and_static(&cache).await;
    cache.shared.set_available(false);

    assert_eq!(
        cache
            .manager
            .invalidate(Invalidation::table("registros_ponto"))
            .await,
        3
    );
    // 共享层中的旧值保留，直到其TTL到期
    cache.shared.set_available(true);
    assert_eq!(cache.shared.list_keys(Some("reports_")).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_table_invalidation_during_slow_set() {
    let dir = tempfile::tempdir().unwrap();
    let manager = create_delayed_cache(&dir, Duration::from_millis(200), |config| config).await;
    let key = dashboard_key("lento");

    // 本地层已写入，共享层写入仍在等待时发生失效
    let dashboard = sample_dashboard();
    let write = manager.set(&key, &dashboard, "dashboard", None);
    let invalidate = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager
            .invalidate(Invalidation::table("registros_ponto"))
            .await
    };
    let ((), removed) = tokio::join!(write, invalidate);

    assert_eq!(removed, 1);
    assert!(!manager.local().contains(&key));
}

#[tokio::test]
async fn test_table_invalidation_follows_latest_category() {
    let cache = create_test_cache().await;
    cache
        .manager
        .set("painel_mensal", &sample_report(2), "reports", None)
        .await;
    // 同一个键改用 static 分类重新写入
    cache
        .manager
        .set("painel_mensal", &json!({"asset": 1}), "static", None)
        .await;

    assert_eq!(
        cache
            .manager
            .invalidate(Invalidation::table("registros_ponto"))
            .await,
        0
    );
    assert!(cache.manager.local().contains("painel_mensal"));
}
