//! 缓存指标
//!
//! 每层一组 {hits, misses, sets} 计数器，外加压缩率和累计写入字节数。
//! 计数器只在运维显式调用 [`CacheMetrics::reset`] 时清零。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::storage::Tier;

/// 单层计数器
#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl TierCounters {
    fn snapshot(&self) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
    }
}

/// 单层统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

/// 三层统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerTierStats {
    pub local: TierStats,
    pub shared: TierStats,
    pub persistent: TierStats,
}

impl PerTierStats {
    pub fn get(&self, tier: Tier) -> TierStats {
        match tier {
            Tier::Local => self.local,
            Tier::Shared => self.shared,
            Tier::Persistent => self.persistent,
        }
    }

    pub fn total_hits(&self) -> u64 {
        self.local.hits + self.shared.hits + self.persistent.hits
    }

    pub fn total_misses(&self) -> u64 {
        self.local.misses + self.shared.misses + self.persistent.misses
    }
}

/// 指标快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub per_tier: PerTierStats,
    /// 压缩后字节数 / 压缩前字节数，仅统计压缩过的条目，无数据时为0
    pub compression_ratio: f64,
    /// 累计写入的编码后字节数
    pub total_bytes: u64,
}

impl MetricsSnapshot {
    /// 总命中率（百分比，四舍五入）
    pub fn hit_rate_percent(&self) -> u64 {
        let hits = self.per_tier.total_hits();
        let total = hits + self.per_tier.total_misses();
        if total == 0 {
            0
        } else {
            ((hits as f64 / total as f64) * 100.0).round() as u64
        }
    }
}

/// 缓存指标
#[derive(Debug, Default)]
pub struct CacheMetrics {
    local: TierCounters,
    shared: TierCounters,
    persistent: TierCounters,
    raw_compressed_bytes: AtomicU64,
    compressed_bytes: AtomicU64,
    total_bytes: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, tier: Tier) -> &TierCounters {
        match tier {
            Tier::Local => &self.local,
            Tier::Shared => &self.shared,
            Tier::Persistent => &self.persistent,
        }
    }

    pub fn record_hit(&self, tier: Tier) {
        self.counters(tier).hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, tier: Tier) {
        self.counters(tier).misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self, tier: Tier) {
        self.counters(tier).sets.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次写入的大小
    pub fn record_size(&self, raw_len: usize, stored_len: usize, compressed: bool) {
        self.total_bytes
            .fetch_add(stored_len as u64, Ordering::Relaxed);
        if compressed {
            self.raw_compressed_bytes
                .fetch_add(raw_len as u64, Ordering::Relaxed);
            self.compressed_bytes
                .fetch_add(stored_len as u64, Ordering::Relaxed);
        }
    }

    pub fn compression_ratio(&self) -> f64 {
        let raw = self.raw_compressed_bytes.load(Ordering::Relaxed);
        if raw == 0 {
            0.0
        } else {
            self.compressed_bytes.load(Ordering::Relaxed) as f64 / raw as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            per_tier: PerTierStats {
                local: self.local.snapshot(),
                shared: self.shared.snapshot(),
                persistent: self.persistent.snapshot(),
            },
            compression_ratio: self.compression_ratio(),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.local.reset();
        self.shared.reset();
        self.persistent.reset();
        self.raw_compressed_bytes.store(0, Ordering::Relaxed);
        self.compressed_bytes.store(0, Ordering::Relaxed);
        self.total_bytes.store(0, Ordering::Relaxed);
    }
}

/// 把指标快照导出为Prometheus文本格式
#[cfg(feature = "monitoring")]
pub fn render_prometheus(
    snapshot: &MetricsSnapshot,
    hot_key_count: usize,
) -> Result<String, prometheus::Error> {
    use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

    let registry = Registry::new();

    let tier_ops = IntGaugeVec::new(
        Opts::new("ponto_cache_tier_operations", "Cache operations per tier"),
        &["tier", "op"],
    )?;
    for tier in [Tier::Local, Tier::Shared, Tier::Persistent] {
        let stats = snapshot.per_tier.get(tier);
        tier_ops
            .with_label_values(&[tier.as_str(), "hit"])
            .set(stats.hits as i64);
        tier_ops
            .with_label_values(&[tier.as_str(), "miss"])
            .set(stats.misses as i64);
        tier_ops
            .with_label_values(&[tier.as_str(), "set"])
            .set(stats.sets as i64);
    }
    registry.register(Box::new(tier_ops))?;

    let ratio = Gauge::new(
        "ponto_cache_compression_ratio",
        "Compressed bytes over raw bytes for compressed entries",
    )?;
    ratio.set(snapshot.compression_ratio);
    registry.register(Box::new(ratio))?;

    let total_bytes = IntGauge::new("ponto_cache_stored_bytes", "Total encoded bytes written")?;
    total_bytes.set(snapshot.total_bytes as i64);
    registry.register(Box::new(total_bytes))?;

    let hot_keys = IntGauge::new("ponto_cache_hot_keys", "Number of hot keys")?;
    hot_keys.set(hot_key_count as i64);
    registry.register(Box::new(hot_keys))?;

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
