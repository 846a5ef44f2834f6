//! 存储抽象层
//!
//! 定义三层缓存共用的存储接口和基本实现。

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::StorageError;

/// 缓存层，按速度从快到慢排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// 进程内内存
    Local,
    /// 多实例共享（网络）
    Shared,
    /// 本地磁盘
    Persistent,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Local => "local",
            Tier::Shared => "shared",
            Tier::Persistent => "persistent",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 缓存层存储接口
#[async_trait]
pub trait TierStore: Send + Sync {
    /// 所属层
    fn tier(&self) -> Tier;

    /// 获取值
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// 设置值
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError>;

    /// 删除值
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// 列出键（可选前缀过滤）
    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;

    /// 清空该层
    async fn clear(&self) -> Result<(), StorageError>;

    /// 最近一次已知的可用状态
    fn is_available(&self) -> bool {
        true
    }

    /// 释放后台资源（健康检查任务等）
    fn close(&self) {}
}

/// 限频日志
///
/// 同一个窗口内最多放行一次，用于防止共享层故障时刷屏。
#[derive(Debug)]
pub struct ThrottledLog {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl ThrottledLog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// 当前是否允许记录日志
    pub fn should_log(&self) -> bool {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// 内存存储实现
///
/// 可作为共享层的替身（单进程部署或测试），支持通过 [`MemoryStore::set_available`] 注入故障。
pub struct MemoryStore {
    tier: Tier,
    data: DashMap<String, (Vec<u8>, Instant)>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::for_tier(Tier::Shared)
    }

    pub fn for_tier(tier: Tier) -> Self {
        Self {
            tier,
            data: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// 设置可用状态（故障注入）
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!("{} 内存存储已禁用", self.tier)))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TierStore for MemoryStore {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.ensure_available()?;
        let expired = match self.data.get(key) {
            Some(entry) if Instant::now() < entry.1 => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.data.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.data
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.data.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.ensure_available()?;
        let now = Instant::now();
        Ok(self
            .data
            .iter()
            .filter(|entry| now < entry.value().1)
            .filter(|entry| prefix.map_or(true, |p| entry.key().starts_with(p)))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.data.clear();
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }
}
