//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Ponto Cache - 三层缓存管理器
//!
//! 为考勤看板、报表和分析接口提供的三层缓存：进程内LRU、Redis共享层和磁盘持久层。
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use ponto_cache::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`CacheManager`] - 三层编排：查找、写穿、失效、统计、维护
//! - [`CacheConfig`] - 配置，支持YAML/TOML文件和环境变量
//! - [`CategoryPolicy`] / [`PolicyTable`] - 分类策略
//! - [`CacheLayer`] - 面向HTTP处理函数的响应缓存适配器
//!
//! ## Tiers
//!
//! - [`LocalStore`] - 进程内LRU，容量满时淘汰最早写入的条目
//! - [`RedisStore`] - Redis共享层（需要 `redis` feature），故障时自动降级
//! - [`PersistentStore`] - 每个键一个JSON文件
//!
//! 自定义共享层只需实现 [`TierStore`]，再通过
//! [`CacheManager::builder`] 注入。
//!
//! # Examples
//!
//! ```rust,no_run
//! use ponto_cache::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> ponto_cache::Result<()> {
//!     let manager = CacheManager::new(CacheConfig::default()).await?;
//!
//!     let key = derive_key(&RequestShape::get("/api/dashboard"), "dashboard");
//!     manager.set(&key, &json!({"total": 42}), "dashboard", None).await;
//!     assert!(manager.get(&key, "dashboard").await.is_some());
//!
//!     // 打卡记录变更后，依赖它的看板和报表一起失效
//!     manager.invalidate(Invalidation::table("registros_ponto")).await;
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **redis** (默认): Redis共享层
//! - **telemetry**: `tracing-subscriber` 日志初始化
//! - **monitoring**: Prometheus文本格式的指标导出

pub mod prelude;

pub mod codec;
pub mod config;
pub mod constants;
pub mod disk_store;
pub mod error;
pub mod key;
pub mod local_store;
pub mod manager;
pub mod metrics;
pub mod middleware;
pub mod policy;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod scheduler;
pub mod storage;
pub mod usage;
#[cfg(feature = "telemetry")]
pub mod telemetry;

// 重新导出常用类型
pub use codec::{Encoded, Envelope};
pub use config::{CacheConfig, MaintenanceConfig, SharedConfig};
pub use disk_store::PersistentStore;
pub use error::{CacheError, DecodeError, Result, StorageError};
pub use key::{derive_key, RequestShape};
pub use local_store::{LocalStats, LocalStore};
pub use manager::{CacheManager, CacheManagerBuilder, CacheStats, Invalidation, KeyIndex};
pub use metrics::{CacheMetrics, MetricsSnapshot, PerTierStats, TierStats};
pub use middleware::{CacheLayer, CacheStatus, CachedResponse, HandlerResponse};
pub use policy::{CategoryPolicy, PolicyTable};
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisStore};
pub use scheduler::{MaintenanceContext, MaintenanceScheduler};
pub use storage::{MemoryStore, ThrottledLog, Tier, TierStore};
pub use usage::{AccessKind, KeyUsage, UsagePattern, UsageSnapshot, UsageTracker};
#[cfg(feature = "telemetry")]
pub use telemetry::init_logging;
