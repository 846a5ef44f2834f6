//! 测试模块根目录
//!
//! 导出所有功能模块的测试

#[allow(unused_imports)]
pub mod invalidation;
#[allow(unused_imports)]
pub mod maintenance;
#[allow(unused_imports)]
pub mod manager;
#[allow(unused_imports)]
pub mod middleware;
#[allow(unused_imports)]
pub mod tiers;
