//! 持久缓存层
//!
//! 每个键对应缓存目录下的一个 `<编码后的键>.cache` 文件，内容为JSON记录
//! `{value, timestamp, ttlMillis, expiresAt}`。
//!
//! 读到过期或损坏的文件时视为不存在，并顺带删除该文件。
//! 同一进程内对同一个键的并发写入以最后完成的一次为准，不做原子重命名。

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::constants::CACHE_FILE_EXTENSION;
use crate::error::StorageError;
use crate::storage::{Tier, TierStore};

/// 磁盘记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskRecord {
    /// 未压缩的原始值
    pub value: Value,
    /// 写入时间（Unix毫秒）
    pub timestamp: i64,
    /// TTL（毫秒）
    pub ttl_millis: u64,
    /// 过期时间（Unix毫秒）
    pub expires_at: i64,
}

impl DiskRecord {
    pub fn new(value: Value, ttl: Duration) -> Self {
        let now = Utc::now().timestamp_millis();
        let ttl_millis = ttl.as_millis() as u64;
        Self {
            value,
            timestamp: now,
            ttl_millis,
            expires_at: now.saturating_add(ttl_millis as i64),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() >= self.expires_at
    }
}

/// 把键编码为安全的文件名（百分号编码）
pub fn encode_file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + CACHE_FILE_EXTENSION.len() + 1);
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name.push('.');
    name.push_str(CACHE_FILE_EXTENSION);
    name
}

/// 从文件名还原键，不是缓存文件时返回 `None`
pub fn decode_file_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(CACHE_FILE_EXTENSION)?.strip_suffix('.')?;
    let raw = stem.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).ok()
}

/// 持久缓存层
#[derive(Debug, Clone)]
pub struct PersistentStore {
    dir: PathBuf,
}

impl PersistentStore {
    /// 创建持久缓存层，目录不存在时自动创建
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            error!("创建缓存目录失败: {}, error={}", dir.display(), e);
            StorageError::from(e)
        })?;
        info!("持久缓存层目录: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(encode_file_name(key))
    }

    /// 读取记录，过期或损坏时删除文件并返回 `None`
    pub async fn read(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<DiskRecord>(&content) {
            Ok(record) if !record.is_expired() => Ok(Some(record.value)),
            Ok(_) => {
                trace!("持久条目已过期: key={}", key);
                self.remove_file(&path).await;
                Ok(None)
            }
            Err(e) => {
                warn!("持久条目已损坏，删除: key={}, error={}", key, e);
                self.remove_file(&path).await;
                Ok(None)
            }
        }
    }

    /// 写入记录
    pub async fn write(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), StorageError> {
        let record = DiskRecord::new(value.clone(), ttl);
        let content = serde_json::to_vec(&record)
            .map_err(|e| StorageError::DiskIo(format!("序列化持久条目失败: {}", e)))?;
        tokio::fs::write(self.path_for(key), content).await?;
        Ok(())
    }

    /// 删除记录，文件不存在不算错误
    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_file(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("删除缓存文件失败: {}, error={}", path.display(), e);
            }
        }
    }

    /// 列出缓存文件的 (键, 路径)
    async fn entries(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(key) = decode_file_name(file_name) {
                entries.push((key, entry.path()));
            }
        }
        Ok(entries)
    }

    /// 扫描并删除过期和损坏的文件，返回删除数量
    pub async fn sweep_expired(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for (key, path) in self.entries().await? {
            let stale = match tokio::fs::read(&path).await {
                Ok(content) => serde_json::from_slice::<DiskRecord>(&content)
                    .map(|record| record.is_expired())
                    .unwrap_or(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("读取缓存文件失败: key={}, error={}", key, e);
                    continue;
                }
            };

            if stale {
                self.remove_file(&path).await;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("持久缓存层清理: 删除了 {} 个文件", removed);
        } else {
            debug!("持久缓存层清理: 无过期文件");
        }
        Ok(removed)
    }

    /// 列出键，可按前缀过滤
    pub async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| prefix.map_or(true, |p| key.starts_with(p)))
            .collect())
    }

    /// 删除所有缓存文件，其他文件保持不动
    pub async fn clear_all(&self) -> Result<usize, StorageError> {
        let entries = self.entries().await?;
        let count = entries.len();
        for (_, path) in entries {
            self.remove_file(&path).await;
        }
        Ok(count)
    }
}

#[async_trait]
impl TierStore for PersistentStore {
    fn tier(&self) -> Tier {
        Tier::Persistent
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.read(key).await? {
            Some(value) => serde_json::to_vec(&value)
                .map(Some)
                .map_err(|e| StorageError::DiskIo(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
        let value: Value = serde_json::from_slice(value)
            .map_err(|e| StorageError::DiskIo(format!("持久层只接受JSON值: {}", e)))?;
        self.write(key, &value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.remove(key).await
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.keys(prefix).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.clear_all().await.map(|_| ())
    }
}
