//! 日志初始化
//!
//! 基于 `tracing-subscriber` 的简单初始化。`RUST_LOG` 环境变量优先于传入的过滤器。
//!
//! # 示例
//!
//! ```rust
//! ponto_cache::telemetry::init_logging("ponto_cache=debug");
//! ```

use tracing_subscriber::{fmt, EnvFilter};

/// 默认日志过滤器
pub const DEFAULT_LOG_FILTER: &str = "ponto_cache=info";

/// 构建日志过滤器，`RUST_LOG` 存在且合法时使用它
pub fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// 初始化全局日志
///
/// 重复调用是安全的，已有全局订阅者时返回 `false`。
pub fn init_logging(default_filter: &str) -> bool {
    fmt()
        .with_env_filter(build_filter(default_filter))
        .with_target(true)
        .try_init()
        .is_ok()
}
