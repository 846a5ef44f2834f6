//! 响应缓存适配器
//!
//! HTTP层使用的薄封装：根据请求特征生成键并查询缓存，命中时跳过处理函数，
//! 未命中时执行处理函数，成功的响应写回缓存。
//! 响应会附带 `X-Cache`、`X-Cache-Key`、`X-Cache-Type` 三个头。

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::key::{derive_key, RequestShape};
use crate::manager::CacheManager;

pub const HEADER_CACHE: &str = "X-Cache";
pub const HEADER_CACHE_KEY: &str = "X-Cache-Key";
pub const HEADER_CACHE_TYPE: &str = "X-Cache-Type";

/// 缓存状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// 处理函数的输出
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: Value,
}

impl HandlerResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// 状态码为200且body中的 `success` 不为 `false`
    pub fn is_success(&self) -> bool {
        self.status == 200 && self.body.get("success") != Some(&Value::Bool(false))
    }
}

/// 带缓存头的响应
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Value,
    pub cache_status: CacheStatus,
    pub headers: Vec<(&'static str, String)>,
}

impl CachedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// 响应缓存层
#[derive(Clone)]
pub struct CacheLayer {
    manager: Arc<CacheManager>,
    category: String,
    ttl: Option<Duration>,
}

impl CacheLayer {
    pub fn new(manager: Arc<CacheManager>, category: impl Into<String>) -> Self {
        Self {
            manager,
            category: category.into(),
            ttl: None,
        }
    }

    /// 覆盖分类TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// 处理一个请求
    pub async fn handle<F, Fut>(&self, request: &RequestShape, handler: F) -> CachedResponse
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HandlerResponse>,
    {
        let key = derive_key(request, &self.category);

        if let Some(body) = self.manager.get(&key, &self.category).await {
            trace!("响应缓存命中: key={}", key);
            return self.respond(200, body, CacheStatus::Hit, key);
        }

        let response = handler().await;
        if response.is_success() {
            self.manager
                .set(&key, &response.body, &self.category, self.ttl)
                .await;
        }
        self.respond(response.status, response.body, CacheStatus::Miss, key)
    }

    fn respond(&self, status: u16, body: Value, cache_status: CacheStatus, key: String) -> CachedResponse {
        CachedResponse {
            status,
            body,
            cache_status,
            headers: vec![
                (HEADER_CACHE, cache_status.as_str().to_string()),
                (HEADER_CACHE_KEY, key),
                (HEADER_CACHE_TYPE, self.category.clone()),
            ],
        }
    }
}
