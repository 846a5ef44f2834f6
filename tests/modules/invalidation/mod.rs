//! 失效测试

pub mod integration;
