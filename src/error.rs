//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。`get`/`set`/`invalidate` 不会向调用方返回这些错误，
//! 它们只在构建、配置加载和检查点读写时出现，或在各层内部被就地吸收。

use thiserror::Error;

/// 缓存管理器错误类型
#[derive(Error, Debug)]
pub enum CacheError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 存储层错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 编解码错误
    #[error("解码错误: {0}")]
    Decode(#[from] DecodeError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    Toml(#[from] toml::de::Error),
}

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// 连接错误
    #[error("连接错误: {0}")]
    ConnectionError(String),

    /// 查询错误
    #[error("查询错误: {0}")]
    QueryError(String),

    /// 超时错误
    #[error("超时错误: {0}")]
    TimeoutError(String),

    /// 层不可用（共享层断开或被禁用）
    #[error("缓存层不可用: {0}")]
    Unavailable(String),

    /// 磁盘IO错误
    #[error("磁盘IO错误: {0}")]
    DiskIo(String),

    /// 未找到
    #[error("未找到: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(err.to_string()),
            _ => StorageError::DiskIo(err.to_string()),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StorageError::TimeoutError(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StorageError::ConnectionError(err.to_string())
        } else {
            StorageError::QueryError(err.to_string())
        }
    }
}

/// 编解码错误
///
/// 调用方把解码失败当作未命中处理，永远不会向上传播。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// 信封格式不正确
    #[error("信封格式错误: {0}")]
    Malformed(String),

    /// 解压失败
    #[error("解压失败: {0}")]
    Decompress(String),

    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialize(String),
}

/// Result 别名
pub type Result<T> = std::result::Result<T, CacheError>;
