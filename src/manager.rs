//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 缓存管理器
//!
//! 三层缓存的编排器：本地层 -> 共享层 -> 持久层。
//!
//! # 特性
//!
//! - **逐层查找**: 按本地、共享、持久的顺序查找，在较慢的层命中后回填到所有较快的层
//! - **写穿**: 写入本地层，共享层可用时写入共享层，分类要求持久化时写入持久层
//! - **依赖失效**: 按表名、分类、通配模式或全部失效
//! - **故障降级**: 任何一层的错误都在内部吸收，`get`/`set`/`invalidate` 永远不会返回错误
//! - **使用追踪**: 记录每个键的访问，热点键由维护任务延长本地TTL
//!
//! 各层之间不保证实时一致，同一个键在不同层可能短暂持有不同的值。

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::codec;
use crate::config::CacheConfig;
use crate::constants::{
    DEFAULT_TOP_KEYS, FAILURE_LOG_WINDOW_SECS, SLOW_GET_THRESHOLD_MS, SLOW_SET_THRESHOLD_MS,
};
use crate::disk_store::PersistentStore;
use crate::error::{Result, StorageError};
use crate::local_store::LocalStore;
use crate::metrics::{CacheMetrics, PerTierStats};
use crate::policy::{CategoryPolicy, PolicyTable};
use crate::scheduler::{MaintenanceContext, MaintenanceScheduler};
use crate::storage::{ThrottledLog, Tier, TierStore};
use crate::usage::{AccessKind, KeyUsage, UsageTracker};

/// 失效方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// 依赖该表的所有分类
    Table(String),
    /// 通配模式，`*` 匹配任意子串，整键匹配
    Pattern(String),
    /// 单个分类
    Category(String),
    /// 全部清空
    All,
}

impl Invalidation {
    pub fn table(table: impl Into<String>) -> Self {
        Self::Table(table.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self::Category(category.into())
    }
}

/// 缓存统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub per_tier: PerTierStats,
    /// 本地层当前条目数
    pub local_keys: usize,
    /// 共享层是否已配置且可用
    pub shared_connected: bool,
    /// 总命中率（百分比）
    pub hit_rate_percent: u64,
    pub compression_ratio: f64,
    pub total_bytes: u64,
    pub hot_key_count: usize,
    /// 追踪中的使用模式数量
    pub tracked_patterns: usize,
    pub top_used_keys: Vec<KeyUsage>,
}

/// 分类到键的二级索引
///
/// 写入和回填时登记键及其过期时间，失效时按分类取出，
/// 避免扫描整个键空间。
#[derive(Debug, Default)]
pub struct KeyIndex {
    by_category: DashMap<String, HashMap<String, Instant>>,
}

impl KeyIndex {
    /// 登记键，同一个键只属于最近一次写入的分类
    pub(crate) fn insert(&self, category: &str, key: &str, ttl: Duration) {
        for mut keys in self.by_category.iter_mut() {
            if keys.key() != category {
                keys.remove(key);
            }
        }
        self.by_category
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), Instant::now() + ttl);
    }

    /// 延长已登记键的过期时间
    pub(crate) fn extend(&self, key: &str, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        for mut keys in self.by_category.iter_mut() {
            if let Some(expires_at) = keys.get_mut(key) {
                if *expires_at < deadline {
                    *expires_at = deadline;
                }
            }
        }
    }

    pub(crate) fn remove(&self, key: &str) {
        for mut keys in self.by_category.iter_mut() {
            keys.remove(key);
        }
    }

    /// 取出某个分类下未过期的键
    pub(crate) fn take_category(&self, category: &str) -> Vec<String> {
        let now = Instant::now();
        self.by_category
            .remove(category)
            .map(|(_, keys)| {
                keys.into_iter()
                    .filter(|(_, expires_at)| *expires_at > now)
                    .map(|(key, _)| key)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 取出满足条件且未过期的键
    pub(crate) fn take_matching<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let now = Instant::now();
        let mut taken = Vec::new();
        for mut keys in self.by_category.iter_mut() {
            keys.retain(|key, expires_at| {
                if !predicate(key) {
                    return true;
                }
                if *expires_at > now {
                    taken.push(key.clone());
                }
                false
            });
        }
        taken
    }

    /// 清空并返回所有未过期的键
    pub(crate) fn drain(&self) -> Vec<String> {
        let taken = self.take_matching(|_| true);
        self.by_category.clear();
        taken
    }

    /// 删除已过期的登记，返回删除数量
    pub(crate) fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut pruned = 0;
        for mut keys in self.by_category.iter_mut() {
            let before = keys.len();
            keys.retain(|_, expires_at| *expires_at > now);
            pruned += before - keys.len();
        }
        self.by_category.retain(|_, keys| !keys.is_empty());
        pruned
    }

    pub fn len(&self) -> usize {
        self.by_category.iter().map(|keys| keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 把通配模式转换为整键匹配的正则
fn glob_to_regex(pattern: &str) -> std::result::Result<regex::Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    regex::Regex::new(&format!("^{}$", body))
}

/// 缓存管理器构建器
pub struct CacheManagerBuilder {
    config: CacheConfig,
    shared: Option<Arc<dyn TierStore>>,
}

impl CacheManagerBuilder {
    /// 使用给定的共享层实现，忽略配置中的 `shared`
    pub fn shared_store(mut self, store: Arc<dyn TierStore>) -> Self {
        self.shared = Some(store);
        self
    }

    pub async fn build(self) -> Result<CacheManager> {
        let CacheManagerBuilder { config, shared } = self;
        config.validate()?;

        let shared = match shared {
            Some(store) => Some(store),
            None => connect_shared(&config).await?,
        };

        CacheManager::assemble(config, shared).await
    }
}

#[cfg(feature = "redis")]
async fn connect_shared(config: &CacheConfig) -> Result<Option<Arc<dyn TierStore>>> {
    use crate::redis_store::{RedisConfig, RedisStore};

    match &config.shared {
        Some(shared) => {
            let store = RedisStore::new(RedisConfig::from(shared)).await?;
            Ok(Some(Arc::new(store)))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_shared(config: &CacheConfig) -> Result<Option<Arc<dyn TierStore>>> {
    if config.shared.is_some() {
        warn!("配置了共享层，但未启用 redis 特性，共享层将被禁用");
    }
    Ok(None)
}

/// 缓存管理器
pub struct CacheManager {
    config: CacheConfig,
    policies: PolicyTable,
    local: Arc<LocalStore>,
    shared: Option<Arc<dyn TierStore>>,
    persistent: Arc<PersistentStore>,
    usage: Arc<UsageTracker>,
    index: Arc<KeyIndex>,
    metrics: CacheMetrics,
    shared_failure_log: ThrottledLog,
    maintenance: MaintenanceContext,
    scheduler: Mutex<Option<MaintenanceScheduler>>,
}

impl CacheManager {
    /// 按配置创建缓存管理器
    ///
    /// 共享层连接失败不会导致创建失败，该层以降级状态启动。
    pub async fn new(config: CacheConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn builder(config: CacheConfig) -> CacheManagerBuilder {
        CacheManagerBuilder {
            config,
            shared: None,
        }
    }

    async fn assemble(config: CacheConfig, shared: Option<Arc<dyn TierStore>>) -> Result<Self> {
        let policies = config.policy_table();
        let local = Arc::new(LocalStore::new(config.local_capacity));
        let persistent = Arc::new(PersistentStore::new(config.cache_dir.clone()).await?);
        let usage = Arc::new(UsageTracker::new(config.hot_key_threshold));
        let index = Arc::new(KeyIndex::default());

        let usage_path = config.usage_path();
        match usage.load(&usage_path).await {
            Ok(true) => {}
            Ok(false) => debug!("未找到使用模式检查点: {}", usage_path.display()),
            Err(e) => warn!("加载使用模式检查点失败，从空状态开始: {}", e),
        }

        let maintenance = MaintenanceContext {
            local: Arc::clone(&local),
            persistent: Arc::clone(&persistent),
            usage: Arc::clone(&usage),
            index: Arc::clone(&index),
            usage_path,
            hot_key_ttl: config.hot_ttl(),
            usage_retention: config.usage_retention(),
        };

        info!(
            "缓存管理器已创建: local_capacity={}, shared={}, cache_dir={}",
            config.local_capacity,
            shared.is_some(),
            config.cache_dir.display()
        );

        Ok(Self {
            config,
            policies,
            local,
            shared,
            persistent,
            usage,
            index,
            metrics: CacheMetrics::new(),
            shared_failure_log: ThrottledLog::new(Duration::from_secs(FAILURE_LOG_WINDOW_SECS)),
            maintenance,
            scheduler: Mutex::new(None),
        })
    }

    /// 可用的共享层
    fn shared_available(&self) -> Option<&Arc<dyn TierStore>> {
        self.shared.as_ref().filter(|store| store.is_available())
    }

    /// 带超时执行共享层操作，超时视为该层不可用
    async fn shared_call<T, Fut>(&self, op: &str, fut: Fut) -> std::result::Result<T, StorageError>
    where
        Fut: Future<Output = std::result::Result<T, StorageError>>,
    {
        let result = tokio::time::timeout(self.config.shared_op_timeout(), fut)
            .await
            .unwrap_or_else(|_| Err(StorageError::TimeoutError(format!("共享层{}超时", op))));

        if let Err(e) = &result {
            if self.shared_failure_log.should_log() {
                warn!("共享层{}失败，已跳过: {}", op, e);
            }
        }
        result
    }

    /// 解析分类策略
    pub fn policy(&self, category: &str) -> &CategoryPolicy {
        self.policies.resolve(category)
    }

    /// 获取值
    ///
    /// 按本地、共享、持久的顺序查找。在较慢的层命中后会先回填到所有较快的层再返回，
    /// 因此紧接着的第二次 `get` 一定命中本地层。任何层的故障都视为未命中。
    pub async fn get(&self, key: &str, category: &str) -> Option<Value> {
        let start = Instant::now();
        let category = self.policies.resolve_name(category);
        let policy = self.policies.resolve(category);
        self.usage.record_access(key, AccessKind::Get);

        let value = self.lookup(key, category, policy).await;

        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(SLOW_GET_THRESHOLD_MS) {
            warn!("缓存读取较慢: key={}, elapsed={:?}", key, elapsed);
        }
        value
    }

    async fn lookup(&self, key: &str, category: &str, policy: &CategoryPolicy) -> Option<Value> {
        // 本地层
        if let Some(bytes) = self.local.get_entry(key) {
            match codec::decode(&bytes) {
                Ok(value) => {
                    self.metrics.record_hit(Tier::Local);
                    trace!("本地层命中: key={}", key);
                    return Some(value);
                }
                Err(e) => {
                    warn!("本地条目解码失败，删除: key={}, error={}", key, e);
                    self.local.remove(key);
                }
            }
        }
        self.metrics.record_miss(Tier::Local);

        // 共享层
        if let Some(shared) = self.shared_available() {
            match self.shared_call("读取", shared.get(key)).await {
                Ok(Some(bytes)) => match codec::decode(&bytes) {
                    Ok(value) => {
                        self.metrics.record_hit(Tier::Shared);
                        trace!("共享层命中，回填本地层: key={}", key);
                        self.local.put(key, bytes, policy.ttl());
                        self.index.insert(category, key, policy.ttl());
                        return Some(value);
                    }
                    Err(e) => {
                        warn!("共享条目解码失败，删除: key={}, error={}", key, e);
                        let _ = self.shared_call("删除", shared.delete(key)).await;
                    }
                },
                Ok(None) | Err(_) => {}
            }
            self.metrics.record_miss(Tier::Shared);
        }

        // 持久层
        if policy.persistent {
            match self.persistent.read(key).await {
                Ok(Some(value)) => {
                    self.metrics.record_hit(Tier::Persistent);
                    trace!("持久层命中，回填: key={}", key);
                    self.promote(key, category, policy, &value).await;
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => warn!("持久层读取失败，视为未命中: key={}, error={}", key, e),
            }
            self.metrics.record_miss(Tier::Persistent);
        }

        trace!("缓存未命中: key={}", key);
        None
    }

    /// 把持久层命中的值写回本地层和共享层
    async fn promote(&self, key: &str, category: &str, policy: &CategoryPolicy, value: &Value) {
        let encoded = match codec::encode(value, policy.compress) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("回填编码失败: key={}, error={}", key, e);
                return;
            }
        };
        let ttl = policy.ttl();
        if let Some(shared) = self.shared_available() {
            let _ = self
                .shared_call("写入", shared.set(key, &encoded.bytes, ttl))
                .await;
        }
        self.local.put(key, encoded.bytes, ttl);
        self.index.insert(category, key, ttl);
    }

    /// 写入值
    ///
    /// `ttl` 为 `None` 时使用分类TTL。本地层写入不会失败，其他层的失败只记录日志。
    pub async fn set(&self, key: &str, value: &Value, category: &str, ttl: Option<Duration>) {
        let start = Instant::now();
        let category = self.policies.resolve_name(category);
        let policy = self.policies.resolve(category);
        let ttl = ttl.unwrap_or_else(|| policy.ttl());

        let encoded = match codec::encode(value, policy.compress) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("缓存值编码失败，跳过写入: key={}, error={}", key, e);
                return;
            }
        };
        let stored_len = encoded.bytes.len();

        // 本地层和索引必须在任何 await 之前写入
        self.local.put(key, encoded.bytes.clone(), ttl);
        self.index.insert(category, key, ttl);
        self.metrics.record_set(Tier::Local);

        // 共享层
        if let Some(shared) = self.shared_available() {
            if self
                .shared_call("写入", shared.set(key, &encoded.bytes, ttl))
                .await
                .is_ok()
            {
                self.metrics.record_set(Tier::Shared);
            }
        }

        // 持久层保存未压缩的原始值
        if policy.persistent {
            match self.persistent.write(key, value, ttl).await {
                Ok(()) => self.metrics.record_set(Tier::Persistent),
                Err(e) => warn!("持久层写入失败: key={}, error={}", key, e),
            }
        }

        self.metrics
            .record_size(encoded.raw_len, stored_len, encoded.compressed);
        self.usage.record_access(key, AccessKind::Set);

        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(SLOW_SET_THRESHOLD_MS) {
            warn!("缓存写入较慢: key={}, elapsed={:?}", key, elapsed);
        }
        trace!("缓存写入: key={}, category={}, ttl={:?}", key, category, ttl);
    }

    /// 获取值，未命中时调用 `loader` 计算并写入
    ///
    /// 并发的未命中不会合并，每个调用方都会执行自己的 `loader`。
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        category: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> std::result::Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
    {
        if let Some(value) = self.get(key, category).await {
            return Ok(value);
        }
        let value = loader().await?;
        self.set(key, &value, category, ttl).await;
        Ok(value)
    }

    /// 按失效方式删除键，返回目标键数量
    ///
    /// 返回的是被选中的键数，不代表每一层都实际删除了这些键。
    pub async fn invalidate(&self, invalidation: Invalidation) -> usize {
        let targets: HashSet<String> = match &invalidation {
            Invalidation::Table(table) => {
                let categories = self.policies.categories_for_table(table);
                debug!("按表失效: table={}, categories={:?}", table, categories);
                let mut keys = HashSet::new();
                for category in &categories {
                    keys.extend(self.index.take_category(category));
                    keys.extend(self.local.keys(Some(&format!("{}_", category))));
                }
                keys
            }
            Invalidation::Category(category) => {
                let prefix = format!("{}_", category);
                let mut keys: HashSet<String> =
                    self.index.take_category(category).into_iter().collect();
                keys.extend(self.local.keys(Some(&prefix)));
                keys
            }
            Invalidation::Pattern(pattern) => match glob_to_regex(pattern) {
                Ok(regex) => {
                    let mut keys: HashSet<String> = self
                        .index
                        .take_matching(|key| regex.is_match(key))
                        .into_iter()
                        .collect();
                    keys.extend(
                        self.local
                            .keys(None)
                            .into_iter()
                            .filter(|key| regex.is_match(key)),
                    );
                    keys
                }
                Err(e) => {
                    warn!("无效的失效模式: pattern={}, error={}", pattern, e);
                    return 0;
                }
            },
            Invalidation::All => return self.flush_all().await,
        };

        for key in &targets {
            self.remove_from_tiers(key).await;
        }

        info!("缓存失效: {:?}, keys={}", invalidation, targets.len());
        targets.len()
    }

    /// 清空所有层，返回清空前已知的键数量
    pub async fn clear(&self) -> usize {
        self.invalidate(Invalidation::All).await
    }

    async fn flush_all(&self) -> usize {
        let mut known: HashSet<String> = self.index.drain().into_iter().collect();
        known.extend(self.local.keys(None));

        self.local.clear_all();
        if let Some(shared) = self.shared_available() {
            let _ = self.shared_call("清空", shared.clear()).await;
        }
        if let Err(e) = self.persistent.clear_all().await {
            warn!("清空持久层失败: {}", e);
        }

        info!("缓存已全部清空: keys={}", known.len());
        known.len()
    }

    /// 从所有层删除一个键
    pub async fn delete(&self, key: &str) {
        self.index.remove(key);
        self.remove_from_tiers(key).await;
        trace!("缓存删除: key={}", key);
    }

    async fn remove_from_tiers(&self, key: &str) {
        self.local.remove(key);
        if let Some(shared) = self.shared_available() {
            let _ = self.shared_call("删除", shared.delete(key)).await;
        }
        if let Err(e) = self.persistent.remove(key).await {
            warn!("持久层删除失败: key={}, error={}", key, e);
        }
    }

    /// 统计信息
    pub fn stats(&self) -> CacheStats {
        let snapshot = self.metrics.snapshot();
        CacheStats {
            per_tier: snapshot.per_tier,
            local_keys: self.local.len(),
            shared_connected: self.shared_available().is_some(),
            hit_rate_percent: snapshot.hit_rate_percent(),
            compression_ratio: snapshot.compression_ratio,
            total_bytes: snapshot.total_bytes,
            hot_key_count: self.usage.hot_key_count(),
            tracked_patterns: self.usage.len(),
            top_used_keys: self.usage.top_n(DEFAULT_TOP_KEYS),
        }
    }

    /// Prometheus文本格式的指标
    #[cfg(feature = "monitoring")]
    pub fn render_metrics(&self) -> Result<String> {
        crate::metrics::render_prometheus(&self.metrics.snapshot(), self.usage.hot_key_count())
            .map_err(|e| crate::error::CacheError::Config(format!("导出指标失败: {}", e)))
    }

    /// 清零指标计数
    pub fn reset_metrics(&self) {
        self.metrics.reset();
        info!("缓存指标已重置");
    }

    /// 启动维护任务，重复调用无效
    pub fn start_maintenance(&self) {
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_none() {
            *scheduler = Some(MaintenanceScheduler::start(
                self.maintenance.clone(),
                &self.config.maintenance,
            ));
        }
    }

    /// 立即执行一次持久层清理
    pub async fn run_persistent_sweep(&self) -> usize {
        self.maintenance.sweep_persistent().await
    }

    /// 立即写入使用模式检查点
    pub async fn checkpoint_usage(&self) -> Result<()> {
        self.maintenance.checkpoint_usage().await
    }

    /// 立即延长热点键TTL
    pub fn extend_hot_keys(&self) -> usize {
        self.maintenance.extend_hot_keys()
    }

    /// 关闭：停止维护任务，写入最后一次检查点，停止共享层健康检查
    pub async fn shutdown(&self) {
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        if let Err(e) = self.checkpoint_usage().await {
            warn!("关闭时写入检查点失败: {}", e);
        }
        if let Some(shared) = &self.shared {
            shared.close();
        }
        info!("缓存管理器已关闭");
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn persistent(&self) -> &PersistentStore {
        &self.persistent
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 是否配置了共享层
    pub fn has_shared(&self) -> bool {
        self.shared.is_some()
    }
}
