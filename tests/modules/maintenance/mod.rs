//! 维护任务测试
