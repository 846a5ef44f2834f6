//! 各缓存层测试

pub mod integration;
