//! 响应缓存适配器测试
