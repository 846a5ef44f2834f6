//! 维护任务调度
//!
//! 三个相互独立的周期任务：
//!
//! - **持久层清理**: 删除过期和损坏的缓存文件，同时清理本地层的过期条目
//! - **使用模式检查点**: 清理闲置模式后把追踪器状态写入磁盘
//! - **热点键TTL延长**: 把仍在本地层的热点键的TTL设置为固定的较高值
//!
//! 每个任务都是"等待一个周期，执行，再等待"，执行时间超过周期时不会追赶。
//! 关闭时正在执行的任务会先完成。

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MaintenanceConfig;
use crate::disk_store::PersistentStore;
use crate::error::Result;
use crate::local_store::LocalStore;
use crate::manager::KeyIndex;
use crate::usage::UsageTracker;

/// 维护任务需要访问的共享状态
#[derive(Clone)]
pub struct MaintenanceContext {
    pub(crate) local: Arc<LocalStore>,
    pub(crate) persistent: Arc<PersistentStore>,
    pub(crate) usage: Arc<UsageTracker>,
    pub(crate) index: Arc<KeyIndex>,
    pub(crate) usage_path: PathBuf,
    pub(crate) hot_key_ttl: Duration,
    pub(crate) usage_retention: Duration,
}

impl MaintenanceContext {
    /// 持久层清理，返回删除的文件数
    ///
    /// 顺带清理本地层中已过期但尚未被访问的条目。
    pub async fn sweep_persistent(&self) -> usize {
        let removed = match self.persistent.sweep_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("持久层清理失败: {}", e);
                0
            }
        };
        let expired_local = self.local.cleanup_expired();
        let pruned = self.index.prune_expired();
        if expired_local > 0 || pruned > 0 {
            debug!(
                "本地层清理了 {} 个过期条目，键索引清理了 {} 个过期键",
                expired_local, pruned
            );
        }
        removed
    }

    /// 写入使用模式检查点
    pub async fn checkpoint_usage(&self) -> Result<()> {
        self.usage.prune_idle(self.usage_retention);
        self.usage.save(&self.usage_path).await
    }

    /// 延长热点键的本地TTL，返回延长的键数
    pub fn extend_hot_keys(&self) -> usize {
        let mut extended = 0;
        for key in self.usage.hot_keys() {
            if self.local.extend_ttl(&key, self.hot_key_ttl) {
                self.index.extend(&key, self.hot_key_ttl);
                extended += 1;
            }
        }
        if extended > 0 {
            debug!("延长了 {} 个热点键的TTL", extended);
        }
        extended
    }
}

/// 维护任务调度器
pub struct MaintenanceScheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    /// 启动三个维护任务
    pub fn start(context: MaintenanceContext, config: &MaintenanceConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweep_ctx = context.clone();
        let checkpoint_ctx = context.clone();
        let hot_ctx = context;

        let handles = vec![
            spawn_job(
                "persistent-sweep",
                config.sweep_interval(),
                shutdown_rx.clone(),
                move || {
                    let ctx = sweep_ctx.clone();
                    async move {
                        ctx.sweep_persistent().await;
                    }
                },
            ),
            spawn_job(
                "usage-checkpoint",
                config.checkpoint_interval(),
                shutdown_rx.clone(),
                move || {
                    let ctx = checkpoint_ctx.clone();
                    async move {
                        if let Err(e) = ctx.checkpoint_usage().await {
                            warn!("写入使用模式检查点失败: {}", e);
                        }
                    }
                },
            ),
            spawn_job(
                "hot-key-extension",
                config.hot_key_interval(),
                shutdown_rx,
                move || {
                    let ctx = hot_ctx.clone();
                    async move {
                        ctx.extend_hot_keys();
                    }
                },
            ),
        ];

        info!(
            "维护任务已启动: sweep={:?}, checkpoint={:?}, hot_keys={:?}",
            config.sweep_interval(),
            config.checkpoint_interval(),
            config.hot_key_interval()
        );

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// 停止所有任务，等待正在执行的任务完成
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("维护任务异常退出: {}", e);
            }
        }
        info!("维护任务已停止");
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn spawn_job<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = shutdown.changed() => break,
            }
            debug!("执行维护任务: {}", name);
            job().await;
        }
        debug!("维护任务退出: {}", name);
    })
}
