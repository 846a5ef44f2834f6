//! 配置模块
//!
//! 定义缓存管理器的配置结构，支持从YAML/TOML文件加载和环境变量覆盖。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::{
    DEFAULT_CACHE_DIR, DEFAULT_CATEGORY, DEFAULT_CHECKPOINT_INTERVAL_SECS,
    DEFAULT_HEALTH_CHECK_INTERVAL_SECS, DEFAULT_HOT_KEY_INTERVAL_SECS, DEFAULT_HOT_KEY_THRESHOLD,
    DEFAULT_HOT_KEY_TTL_SECS, DEFAULT_LOCAL_CAPACITY, DEFAULT_REDIS_URL,
    DEFAULT_SHARED_TIMEOUT_MS, DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_TTL_SECS,
    DEFAULT_USAGE_RETENTION_SECS, USAGE_CHECKPOINT_FILE,
};
use crate::error::{CacheError, Result};
use crate::policy::{CategoryPolicy, PolicyTable};

/// 缓存管理器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 本地层最大条目数
    pub local_capacity: usize,
    /// 内置默认分类（queries）的TTL（秒），`categories` 中显式配置该分类时以后者为准
    pub default_ttl_secs: u64,
    /// 持久层目录
    pub cache_dir: PathBuf,
    /// 使用模式检查点文件，未设置时位于 `cache_dir` 下
    pub usage_file: Option<PathBuf>,
    /// 未知分类回退到的分类
    pub default_category: String,
    /// 热点阈值（频率严格大于该值）
    pub hot_key_threshold: u64,
    /// 热点键的本地TTL（秒）
    pub hot_key_ttl_secs: u64,
    /// 闲置使用模式保留时间（秒）
    pub usage_retention_secs: u64,
    /// 共享层配置，未设置时不启用共享层
    pub shared: Option<SharedConfig>,
    /// 单次共享层操作的超时（毫秒）
    pub shared_timeout_ms: u64,
    /// 维护任务周期
    pub maintenance: MaintenanceConfig,
    /// 自定义分类，覆盖或追加到内置分类表
    pub categories: HashMap<String, CategoryPolicy>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: DEFAULT_LOCAL_CAPACITY,
            default_ttl_secs: DEFAULT_TTL_SECS,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            usage_file: None,
            default_category: DEFAULT_CATEGORY.to_string(),
            hot_key_threshold: DEFAULT_HOT_KEY_THRESHOLD,
            hot_key_ttl_secs: DEFAULT_HOT_KEY_TTL_SECS,
            usage_retention_secs: DEFAULT_USAGE_RETENTION_SECS,
            shared: None,
            shared_timeout_ms: DEFAULT_SHARED_TIMEOUT_MS,
            maintenance: MaintenanceConfig::default(),
            categories: HashMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从文件加载，按扩展名选择YAML或TOML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let config: CacheConfig = match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(CacheError::Config(format!(
                    "不支持的配置文件格式: {:?}",
                    other
                )))
            }
        };
        debug!("从文件加载缓存配置: {}", path.display());
        Ok(config)
    }

    /// 应用环境变量覆盖（`REDIS_URL`、`CACHE_DIR`）
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("REDIS_URL") {
            if !url.is_empty() {
                let mut shared = self.shared.take().unwrap_or_default();
                shared.url = url;
                self.shared = Some(shared);
            }
        }
        if let Ok(dir) = std::env::var("CACHE_DIR") {
            if !dir.is_empty() {
                self.cache_dir = PathBuf::from(dir);
            }
        }
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.local_capacity == 0 {
            return Err(CacheError::Config("本地层容量必须大于0".to_string()));
        }
        if self.default_ttl_secs == 0 {
            return Err(CacheError::Config("默认TTL必须大于0".to_string()));
        }
        if self.hot_key_ttl_secs == 0 {
            return Err(CacheError::Config("热点键TTL必须大于0".to_string()));
        }
        if self.shared_timeout_ms == 0 {
            return Err(CacheError::Config("共享层超时必须大于0".to_string()));
        }

        for (name, policy) in &self.categories {
            if name.is_empty() {
                return Err(CacheError::Config("分类名不能为空".to_string()));
            }
            if policy.ttl_secs == 0 {
                return Err(CacheError::Config(format!("分类 {} 的TTL必须大于0", name)));
            }
        }

        if !self.policy_table_unchecked().contains(&self.default_category) {
            return Err(CacheError::Config(format!(
                "默认分类不存在: {}",
                self.default_category
            )));
        }

        self.maintenance.validate()?;
        if let Some(shared) = &self.shared {
            shared.validate()?;
        }
        Ok(())
    }

    fn policy_table_unchecked(&self) -> PolicyTable {
        PolicyTable::default()
            .with_default_ttl(self.default_ttl_secs)
            .with_overrides(
                self.categories
                    .iter()
                    .map(|(name, policy)| (name.clone(), policy.clone())),
            )
    }

    /// 构建分类策略表
    pub fn policy_table(&self) -> PolicyTable {
        self.policy_table_unchecked()
            .default_category(self.default_category.clone())
    }

    /// 检查点文件路径
    pub fn usage_path(&self) -> PathBuf {
        self.usage_file
            .clone()
            .unwrap_or_else(|| self.cache_dir.join(USAGE_CHECKPOINT_FILE))
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn hot_ttl(&self) -> Duration {
        Duration::from_secs(self.hot_key_ttl_secs)
    }

    pub fn usage_retention(&self) -> Duration {
        Duration::from_secs(self.usage_retention_secs)
    }

    pub fn shared_op_timeout(&self) -> Duration {
        Duration::from_millis(self.shared_timeout_ms)
    }

    /// 设置本地层容量
    pub fn local_capacity(mut self, capacity: usize) -> Self {
        self.local_capacity = capacity;
        self
    }

    /// 设置持久层目录
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// 设置检查点文件
    pub fn usage_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.usage_file = Some(path.into());
        self
    }

    /// 设置共享层
    pub fn shared(mut self, shared: SharedConfig) -> Self {
        self.shared = Some(shared);
        self
    }

    /// 设置共享层操作超时
    pub fn shared_timeout(mut self, timeout: Duration) -> Self {
        self.shared_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 设置热点阈值
    pub fn hot_key_threshold(mut self, threshold: u64) -> Self {
        self.hot_key_threshold = threshold;
        self
    }

    /// 设置热点键TTL
    pub fn hot_key_ttl(mut self, ttl: Duration) -> Self {
        self.hot_key_ttl_secs = ttl.as_secs();
        self
    }

    /// 设置维护任务周期
    pub fn maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    /// 添加或覆盖分类
    pub fn category(mut self, name: impl Into<String>, policy: CategoryPolicy) -> Self {
        self.categories.insert(name.into(), policy);
        self
    }

    /// 设置默认分类
    pub fn default_category(mut self, name: impl Into<String>) -> Self {
        self.default_category = name.into();
        self
    }
}

/// 共享层（Redis）配置
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    pub url: String,
    pub db: i64,
    pub password: Option<String>,
    pub connection_timeout_ms: u64,
    pub io_timeout_ms: u64,
    pub health_check_interval_secs: u64,
}

impl std::fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConfig")
            .field("url", &self.url)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("io_timeout_ms", &self.io_timeout_ms)
            .field("health_check_interval_secs", &self.health_check_interval_secs)
            .finish()
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            db: 0,
            password: None,
            connection_timeout_ms: 2_000,
            io_timeout_ms: DEFAULT_SHARED_TIMEOUT_MS,
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
        }
    }
}

impl SharedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("redis://") || self.url.starts_with("rediss://")) {
            return Err(CacheError::Config(format!(
                "共享层URL必须以 redis:// 或 rediss:// 开头: {}",
                self.url
            )));
        }
        if self.connection_timeout_ms == 0 || self.io_timeout_ms == 0 {
            return Err(CacheError::Config("共享层超时必须大于0".to_string()));
        }
        if self.health_check_interval_secs == 0 {
            return Err(CacheError::Config("健康检查间隔必须大于0".to_string()));
        }
        Ok(())
    }
}

/// 维护任务周期配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// 持久层过期清理周期（秒）
    pub sweep_interval_secs: u64,
    /// 使用模式检查点周期（秒）
    pub checkpoint_interval_secs: u64,
    /// 热点键TTL延长周期（秒）
    pub hot_key_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL_SECS,
            hot_key_interval_secs: DEFAULT_HOT_KEY_INTERVAL_SECS,
        }
    }
}

impl MaintenanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0
            || self.checkpoint_interval_secs == 0
            || self.hot_key_interval_secs == 0
        {
            return Err(CacheError::Config("维护任务周期必须大于0".to_string()));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    pub fn hot_key_interval(&self) -> Duration {
        Duration::from_secs(self.hot_key_interval_secs)
    }
}
