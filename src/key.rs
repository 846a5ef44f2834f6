//! 缓存键生成
//!
//! 键格式：`{category}_{METHOD}_{path}_{hash}`，截断到64个字符。
//! 哈希覆盖分类、方法、路径、查询参数、请求体（仅非GET）和调用方身份，
//! 取 blake3 输出的前128位，十六进制编码。

use serde_json::Value;

use crate::constants::{ANONYMOUS_IDENTITY, KEY_HASH_BYTES, MAX_KEY_LENGTH};

/// 参与键计算的请求特征
#[derive(Debug, Clone, PartialEq)]
pub struct RequestShape {
    pub method: String,
    pub path: String,
    pub query: Value,
    pub body: Option<Value>,
    pub identity: Option<String>,
}

impl RequestShape {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            query: Value::Object(Default::default()),
            body: None,
            identity: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// 生成缓存键
///
/// 相同输入总是得到相同的键。`serde_json::Map` 按键排序，
/// 因此查询参数和请求体的字段顺序不影响结果。
pub fn derive_key(request: &RequestShape, category: &str) -> String {
    let method = request.method.to_ascii_uppercase();
    let query = request.query.to_string();
    let body = match (&request.body, request.is_get()) {
        (Some(body), false) => body.to_string(),
        _ => String::new(),
    };
    let identity = request.identity.as_deref().unwrap_or(ANONYMOUS_IDENTITY);

    let mut hasher = blake3::Hasher::new();
    let parts = [
        category,
        method.as_str(),
        request.path.as_str(),
        query.as_str(),
        body.as_str(),
        identity,
    ];
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    let digest = hasher.finalize();
    let hash = hex::encode(&digest.as_bytes()[..KEY_HASH_BYTES]);

    let mut key = format!("{}_{}_{}_{}", category, method, request.path, hash);
    truncate_chars(&mut key, MAX_KEY_LENGTH);
    key
}

fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}
