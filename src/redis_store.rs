//! 共享缓存层（Redis）
//!
//! 多实例共享的缓存层，基于 `redis::aio::ConnectionManager`。
//!
//! # 特性
//!
//! - **可用性标志**: 任何操作失败都会把该层标记为不可用，编排器随后直接跳过它
//! - **健康检查**: 后台任务周期性 PING，连接恢复后重新启用
//! - **限频日志**: 故障日志每个窗口最多记录一次，防止刷屏
//! - **安全认证**: 密码使用 `secrecy::Secret` 包装

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use redis::{aio::ConnectionManager, AsyncCommands, Client, IntoConnectionInfo};
use secrecy::{ExposeSecret, Secret};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::SharedConfig;
use crate::constants::{
    DEFAULT_HEALTH_CHECK_INTERVAL_SECS, DEFAULT_REDIS_URL, FAILURE_LOG_WINDOW_SECS,
};
use crate::error::StorageError;
use crate::storage::{ThrottledLog, Tier, TierStore};

/// SCAN 每批数量
const SCAN_BATCH: usize = 200;

/// Redis配置
#[derive(Clone)]
pub struct RedisConfig {
    /// Redis连接URL
    pub url: String,
    /// 数据库索引
    pub db: i64,
    /// 密码（使用 Secret 包装以防止意外泄露）
    pub password: Option<Secret<String>>,
    /// 连接超时
    pub connection_timeout: Duration,
    /// 读写超时
    pub io_timeout: Duration,
    /// 不可用时的健康检查间隔
    pub health_check_interval: Duration,
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &self.url)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connection_timeout", &self.connection_timeout)
            .field("io_timeout", &self.io_timeout)
            .field("health_check_interval", &self.health_check_interval)
            .finish()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            db: 0,
            password: None,
            connection_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(1),
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
        }
    }
}

impl RedisConfig {
    /// 创建新的Redis配置
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 设置数据库索引
    pub fn db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// 设置密码
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password.into()));
        self
    }

    /// 设置连接超时
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// 设置IO超时
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// 设置健康检查间隔
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// 构建连接信息，URL中的认证信息会被显式配置覆盖
    pub fn connection_info(&self) -> Result<redis::ConnectionInfo, StorageError> {
        let mut info = self
            .url
            .as_str()
            .into_connection_info()
            .map_err(|e| StorageError::ConnectionError(format!("无效的Redis URL: {}", e)))?;

        info.redis.db = self.db;
        if let Some(password) = &self.password {
            info.redis.password = Some(password.expose_secret().clone());
        }
        Ok(info)
    }
}

impl From<&SharedConfig> for RedisConfig {
    fn from(shared: &SharedConfig) -> Self {
        let config = RedisConfig::new(shared.url.clone())
            .db(shared.db)
            .connection_timeout(Duration::from_millis(shared.connection_timeout_ms))
            .io_timeout(Duration::from_millis(shared.io_timeout_ms))
            .health_check_interval(Duration::from_secs(shared.health_check_interval_secs));
        match &shared.password {
            Some(password) => config.password(password.clone()),
            None => config,
        }
    }
}

struct RedisInner {
    client: Client,
    config: RedisConfig,
    conn: RwLock<Option<ConnectionManager>>,
    available: AtomicBool,
    failure_log: ThrottledLog,
}

impl RedisInner {
    fn mark_available(&self) {
        if !self.available.swap(true, Ordering::Relaxed) {
            info!("共享缓存层已恢复: {}", self.config.url);
        }
    }

    fn mark_unavailable(&self, reason: &StorageError) {
        let was_available = self.available.swap(false, Ordering::Relaxed);
        if self.failure_log.should_log() {
            if was_available {
                warn!("共享缓存层不可用，已降级: {}", reason);
            } else {
                warn!("共享缓存层仍不可用: {}", reason);
            }
        }
    }

    async fn connect(&self) -> Result<ConnectionManager, StorageError> {
        debug!("建立Redis连接: {}", self.config.url);
        let manager = tokio::time::timeout(
            self.config.connection_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await
        .map_err(|_| StorageError::TimeoutError("建立Redis连接超时".to_string()))??;

        *self.conn.write() = Some(manager.clone());
        Ok(manager)
    }

    fn connection(&self) -> Result<ConnectionManager, StorageError> {
        self.conn
            .read()
            .clone()
            .ok_or_else(|| StorageError::Unavailable("Redis连接未建立".to_string()))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = match self.connection() {
            Ok(conn) => conn,
            Err(_) => self.connect().await?,
        };
        let cmd = redis::cmd("PING");
        let ping = cmd.query_async::<_, String>(&mut conn);
        tokio::time::timeout(self.config.io_timeout, ping)
            .await
            .map_err(|_| StorageError::TimeoutError("PING超时".to_string()))??;
        Ok(())
    }

    /// 执行一次操作，失败时标记为不可用
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        if !self.available.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable("共享缓存层已降级".to_string()));
        }

        let result = match self.connection() {
            Ok(conn) => tokio::time::timeout(self.config.io_timeout, op(conn))
                .await
                .unwrap_or_else(|_| Err(StorageError::TimeoutError("Redis操作超时".to_string()))),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.mark_unavailable(e);
        }
        result
    }
}

/// 共享缓存层
pub struct RedisStore {
    inner: Arc<RedisInner>,
    health_check_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RedisStore {
    /// 创建共享缓存层
    ///
    /// 只有URL无效时返回错误。连接失败时该层以不可用状态启动，由健康检查任务负责恢复。
    pub async fn new(config: RedisConfig) -> Result<Self, StorageError> {
        info!("创建共享缓存层, Redis URL: {}", config.url);

        let client = Client::open(config.connection_info()?)
            .map_err(|e| StorageError::ConnectionError(format!("创建Redis客户端失败: {}", e)))?;

        let inner = Arc::new(RedisInner {
            client,
            config,
            conn: RwLock::new(None),
            available: AtomicBool::new(false),
            failure_log: ThrottledLog::new(Duration::from_secs(FAILURE_LOG_WINDOW_SECS)),
        });

        match inner.ping().await {
            Ok(()) => inner.mark_available(),
            Err(e) => inner.mark_unavailable(&e),
        }

        let health_check_handle = Self::start_health_check(Arc::clone(&inner));

        Ok(Self {
            inner,
            health_check_handle: Mutex::new(Some(health_check_handle)),
        })
    }

    /// 启动健康检查任务
    fn start_health_check(inner: Arc<RedisInner>) -> JoinHandle<()> {
        let interval = inner.config.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if inner.available.load(Ordering::Relaxed) {
                    continue;
                }

                trace!("尝试恢复共享缓存层");
                match inner.ping().await {
                    Ok(()) => inner.mark_available(),
                    Err(e) => inner.mark_unavailable(&e),
                }
            }
        })
    }

    /// 停止健康检查任务
    pub fn shutdown(&self) {
        if let Some(handle) = self.health_check_handle.lock().take() {
            handle.abort();
            debug!("共享缓存层健康检查已停止");
        }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.inner.config
    }
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 转义 SCAN MATCH 中的通配字符
fn escape_glob(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl TierStore for RedisStore {
    fn tier(&self) -> Tier {
        Tier::Shared
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner
            .run(|mut conn| async move {
                let value: Option<Vec<u8>> = conn.get(key).await?;
                Ok(value)
            })
            .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
        let ttl_ms = ttl.as_millis().max(1) as u64;
        self.inner
            .run(|mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async::<_, ()>(&mut conn)
                    .await?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner
            .run(|mut conn| async move {
                conn.del::<_, ()>(key).await?;
                Ok(())
            })
            .await
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let pattern = format!("{}*", escape_glob(prefix.unwrap_or("")));
        self.inner
            .run(|mut conn| async move {
                let mut keys = Vec::new();
                let mut cursor: u64 = 0;
                loop {
                    let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await?;
                    keys.extend(batch);
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Ok(keys)
            })
            .await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.inner
            .run(|mut conn| async move {
                redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn).await?;
                Ok(())
            })
            .await
    }

    fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.shutdown();
    }
}
