//! 分类策略表
//!
//! 把缓存分类（dashboard、reports ...）映射到 TTL、压缩、持久化和失效依赖。
//! 策略表在进程启动时构建，之后只读。

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_CATEGORY, WILDCARD_DEPENDENCY};

/// 单个分类的缓存策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPolicy {
    /// 存活时间（秒）
    pub ttl_secs: u64,
    /// 是否压缩
    #[serde(default)]
    pub compress: bool,
    /// 是否写入持久层
    #[serde(default)]
    pub persistent: bool,
    /// 触发失效的表名，`"*"` 表示任何变更
    #[serde(default)]
    pub invalidate_on: Vec<String>,
}

impl CategoryPolicy {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            compress: false,
            persistent: false,
            invalidate_on: Vec::new(),
        }
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn invalidate_on<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidate_on = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// 该分类是否依赖给定的表
    pub fn depends_on(&self, table: &str) -> bool {
        self.invalidate_on
            .iter()
            .any(|dep| dep == table || dep == WILDCARD_DEPENDENCY)
    }
}

/// 分类策略表
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<String, CategoryPolicy>,
    default_category: String,
    // 默认分类策略的副本，解析未知分类时使用
    fallback: CategoryPolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(
            "dashboard".to_string(),
            CategoryPolicy::new(60).invalidate_on(["registros_ponto", "colaboradores"]),
        );
        policies.insert(
            "reports".to_string(),
            CategoryPolicy::new(900)
                .compress(true)
                .persistent(true)
                .invalidate_on(["registros_ponto"]),
        );
        policies.insert(
            "analytics".to_string(),
            CategoryPolicy::new(600)
                .compress(true)
                .persistent(true)
                .invalidate_on(["registros_ponto", "colaboradores"]),
        );
        policies.insert(
            "auth".to_string(),
            CategoryPolicy::new(1800).invalidate_on(["usuarios", "sessions"]),
        );
        policies.insert(
            "static".to_string(),
            CategoryPolicy::new(3600).compress(true).persistent(true),
        );
        let fallback = CategoryPolicy::new(300)
            .compress(true)
            .invalidate_on([WILDCARD_DEPENDENCY]);
        policies.insert(DEFAULT_CATEGORY.to_string(), fallback.clone());

        Self {
            policies,
            default_category: DEFAULT_CATEGORY.to_string(),
            fallback,
        }
    }
}

impl PolicyTable {
    /// 创建空策略表，仅包含默认分类
    pub fn new(default_category: impl Into<String>, default_policy: CategoryPolicy) -> Self {
        let default_category = default_category.into();
        let mut policies = HashMap::new();
        policies.insert(default_category.clone(), default_policy.clone());
        Self {
            policies,
            default_category,
            fallback: default_policy,
        }
    }

    /// 在内置策略之上合并自定义分类
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, CategoryPolicy)>,
    {
        for (name, policy) in overrides {
            if name == self.default_category {
                self.fallback = policy.clone();
            }
            self.policies.insert(name, policy);
        }
        self
    }

    /// 设置默认分类的TTL
    pub fn with_default_ttl(mut self, ttl_secs: u64) -> Self {
        if let Some(policy) = self.policies.get_mut(&self.default_category) {
            policy.ttl_secs = ttl_secs;
        }
        self.fallback.ttl_secs = ttl_secs;
        self
    }

    /// 更换默认分类（必须已存在）
    pub fn default_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        if let Some(policy) = self.policies.get(&category) {
            self.fallback = policy.clone();
            self.default_category = category;
        }
        self
    }

    /// 解析分类策略，未知分类回退到默认分类
    pub fn resolve(&self, category: &str) -> &CategoryPolicy {
        self.policies.get(category).unwrap_or(&self.fallback)
    }

    /// 解析后实际生效的分类名
    pub fn resolve_name<'a>(&'a self, category: &'a str) -> &'a str {
        if self.policies.contains_key(category) {
            category
        } else {
            &self.default_category
        }
    }

    /// 依赖给定表的所有分类
    pub fn categories_for_table(&self, table: &str) -> HashSet<String> {
        self.policies
            .iter()
            .filter(|(_, policy)| policy.depends_on(table))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.policies.contains_key(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn default_category_name(&self) -> &str {
        &self.default_category
    }
}
