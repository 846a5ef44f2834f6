//! 使用模式追踪
//!
//! 记录每个键的读写次数和最近访问时间，识别热点键。
//! 状态可以定期写入检查点文件，并在启动时恢复。

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::DEFAULT_HOT_KEY_THRESHOLD;
use crate::error::Result;

/// 访问类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Get,
    Set,
}

/// 单个键的使用模式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePattern {
    pub gets: u64,
    pub sets: u64,
    pub last_access_at: DateTime<Utc>,
    /// 始终等于 `gets + sets`
    pub frequency: u64,
    /// 首次出现的顺序，用于 top-N 排序时打破平局
    #[serde(default)]
    pub seq: u64,
}

impl UsagePattern {
    fn new(seq: u64) -> Self {
        Self {
            gets: 0,
            sets: 0,
            last_access_at: Utc::now(),
            frequency: 0,
            seq,
        }
    }

    fn record(&mut self, kind: AccessKind) {
        match kind {
            AccessKind::Get => self.gets += 1,
            AccessKind::Set => self.sets += 1,
        }
        self.frequency = self.gets + self.sets;
        self.last_access_at = Utc::now();
    }
}

/// 检查点内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub patterns: HashMap<String, UsagePattern>,
    pub hot_keys: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// top-N 条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsage {
    pub key: String,
    pub frequency: u64,
}

/// 使用模式追踪器
#[derive(Debug)]
pub struct UsageTracker {
    patterns: DashMap<String, UsagePattern>,
    hot_keys: DashSet<String>,
    threshold: u64,
    next_seq: AtomicU64,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HOT_KEY_THRESHOLD)
    }
}

impl UsageTracker {
    /// 创建追踪器，频率严格大于 `threshold` 的键视为热点
    pub fn new(threshold: u64) -> Self {
        Self {
            patterns: DashMap::new(),
            hot_keys: DashSet::new(),
            threshold,
            next_seq: AtomicU64::new(0),
        }
    }

    /// 记录一次访问，返回该键此刻是否为热点
    pub fn record_access(&self, key: &str, kind: AccessKind) -> bool {
        let frequency = {
            let mut pattern = self.patterns.entry(key.to_string()).or_insert_with(|| {
                UsagePattern::new(self.next_seq.fetch_add(1, Ordering::Relaxed))
            });
            pattern.record(kind);
            pattern.frequency
        };

        let hot = frequency > self.threshold;
        if hot && self.hot_keys.insert(key.to_string()) {
            debug!("发现热点键: key={}, frequency={}", key, frequency);
        }
        hot
    }

    pub fn is_hot(&self, key: &str) -> bool {
        self.patterns
            .get(key)
            .map_or(false, |pattern| pattern.frequency > self.threshold)
    }

    /// 热点键集合
    pub fn hot_keys(&self) -> Vec<String> {
        self.hot_keys.iter().map(|key| key.clone()).collect()
    }

    pub fn hot_key_count(&self) -> usize {
        self.hot_keys.len()
    }

    /// 频率最高的 `n` 个键，频率相同时先出现的排在前面
    pub fn top_n(&self, n: usize) -> Vec<KeyUsage> {
        let mut all: Vec<(String, u64, u64)> = self
            .patterns
            .iter()
            .map(|entry| (entry.key().clone(), entry.frequency, entry.seq))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        all.into_iter()
            .take(n)
            .map(|(key, frequency, _)| KeyUsage { key, frequency })
            .collect()
    }

    pub fn pattern(&self, key: &str) -> Option<UsagePattern> {
        self.patterns.get(key).map(|pattern| pattern.clone())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// 删除超过 `retention` 未访问的模式，返回删除数量
    pub fn prune_idle(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;

        let before = self.patterns.len();
        self.patterns
            .retain(|_, pattern| pattern.last_access_at >= cutoff);
        self.hot_keys.retain(|key| self.patterns.contains_key(key));

        let pruned = before.saturating_sub(self.patterns.len());
        if pruned > 0 {
            debug!("清理了 {} 个闲置使用模式", pruned);
        }
        pruned
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            patterns: self
                .patterns
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            hot_keys: self.hot_keys(),
            timestamp: Utc::now(),
        }
    }

    /// 用检查点替换当前状态
    pub fn restore(&self, snapshot: UsageSnapshot) {
        self.patterns.clear();
        self.hot_keys.clear();

        let mut max_seq = 0;
        for (key, mut pattern) in snapshot.patterns {
            pattern.frequency = pattern.gets + pattern.sets;
            max_seq = max_seq.max(pattern.seq + 1);
            if pattern.frequency > self.threshold {
                self.hot_keys.insert(key.clone());
            }
            self.patterns.insert(key, pattern);
        }
        for key in snapshot.hot_keys {
            if self.patterns.contains_key(&key) {
                self.hot_keys.insert(key);
            }
        }
        self.next_seq.store(max_seq, Ordering::Relaxed);
    }

    /// 写入检查点，覆盖旧文件
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        let content = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        debug!(
            "使用模式检查点已写入: {}, patterns={}",
            path.display(),
            snapshot.patterns.len()
        );
        Ok(())
    }

    /// 从检查点恢复，文件不存在时返回 `false`
    pub async fn load(&self, path: &Path) -> Result<bool> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let snapshot: UsageSnapshot = serde_json::from_slice(&content)?;
        info!(
            "从检查点恢复使用模式: patterns={}, hot_keys={}",
            snapshot.patterns.len(),
            snapshot.hot_keys.len()
        );
        self.restore(snapshot);
        Ok(true)
    }
}
