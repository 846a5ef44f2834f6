//! 集成测试模块
//!
//! 需要外部服务的测试

#[cfg(feature = "redis")]
#[allow(unused_imports)]
mod redis_test;

#[cfg(feature = "redis")]
#[allow(unused_imports)]
pub use redis_test::*;
