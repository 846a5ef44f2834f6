//! 本地缓存层实现
//!
//! 使用 `lru::LruCache` 实现的有界进程内缓存，支持逐条TTL和容量淘汰。
//!
//! # 特性
//!
//! - **同步原子**: 所有操作在一把锁内完成，不存在挂起点，并发请求不会看到撕裂的读写
//! - **TTL管理**: 读取时惰性过期，另有 [`LocalStore::cleanup_expired`] 主动清理
//! - **容量淘汰**: 读取使用 `peek`，因此淘汰顺序是"最久未写入"而不是"最久未读取"
//! - **TTL延长**: 供热点键维护任务使用

use async_trait::async_trait;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::constants::DEFAULT_LOCAL_CAPACITY;
use crate::error::StorageError;
use crate::storage::{Tier, TierStore};

/// 本地缓存条目
#[derive(Debug, Clone)]
pub struct LocalEntry {
    /// 编码后的信封字节
    pub payload: Vec<u8>,
    /// 写入时间
    pub created_at: Instant,
    /// 过期时间
    pub expires_at: Instant,
}

impl LocalEntry {
    fn new(payload: Vec<u8>, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            payload,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// 检查是否过期
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// 本地缓存统计
#[derive(Debug, Default)]
pub struct LocalStats {
    expirations: AtomicU64,
    evictions: AtomicU64,
}

impl LocalStats {
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// 本地缓存层
pub struct LocalStore {
    data: Mutex<lru::LruCache<String, LocalEntry>>,
    capacity: usize,
    stats: LocalStats,
}

impl LocalStore {
    /// 创建本地缓存
    ///
    /// # 参数
    ///
    /// * `capacity` - 最大条目数，0 视为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let bound = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            data: Mutex::new(lru::LruCache::new(bound)),
            capacity,
            stats: LocalStats::default(),
        }
    }

    /// 获取未过期的值，过期条目顺带移除
    pub fn get_entry(&self, key: &str) -> Option<Vec<u8>> {
        let mut cache = self.data.lock();
        let expired = match cache.peek(key) {
            Some(entry) if !entry.is_expired() => return Some(entry.payload.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            trace!("本地条目已过期: key={}", key);
        }
        None
    }

    /// 写入值，满容量时淘汰最久未写入的条目
    pub fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration) {
        let mut cache = self.data.lock();
        let entry = LocalEntry::new(payload, ttl);
        if let Some((evicted, _)) = cache.push(key.to_string(), entry) {
            if evicted != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("本地缓存已满，淘汰: key={}", evicted);
            }
        }
    }

    /// 删除值，返回是否存在
    pub fn remove(&self, key: &str) -> bool {
        self.data.lock().pop(key).is_some()
    }

    /// 键是否存在且未过期
    pub fn contains(&self, key: &str) -> bool {
        self.data
            .lock()
            .peek(key)
            .map_or(false, |entry| !entry.is_expired())
    }

    /// 把未过期条目的剩余TTL设置为 `ttl`，返回是否成功
    pub fn extend_ttl(&self, key: &str, ttl: Duration) -> bool {
        let mut cache = self.data.lock();
        match cache.peek_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    /// 剩余TTL
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        self.data.lock().peek(key).and_then(|entry| {
            let now = Instant::now();
            (entry.expires_at > now).then(|| entry.expires_at - now)
        })
    }

    /// 未过期的键，可按前缀过滤
    pub fn keys(&self, prefix: Option<&str>) -> Vec<String> {
        self.data
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// 清理过期数据
    pub fn cleanup_expired(&self) -> usize {
        let mut cache = self.data.lock();
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            cache.pop(key);
        }
        self.stats
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);

        if !expired.is_empty() {
            debug!("清理了 {} 条过期本地数据", expired.len());
        }
        expired.len()
    }

    /// 清空
    pub fn clear_all(&self) -> usize {
        let mut cache = self.data.lock();
        let count = cache.len();
        cache.clear();
        count
    }

    /// 当前条目数（含尚未清理的过期条目）
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &LocalStats {
        &self.stats
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_CAPACITY)
    }
}

#[async_trait]
impl TierStore for LocalStore {
    fn tier(&self) -> Tier {
        Tier::Local
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.get_entry(key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
        self.put(key, value.to_vec(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        Ok(self.keys(prefix))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.clear_all();
        Ok(())
    }
}
