//! 缓存管理器测试

pub mod integration;
