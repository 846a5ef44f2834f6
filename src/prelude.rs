//! Prelude module - Commonly used types for quick imports
//!
//! `use ponto_cache::prelude::*;` brings the manager, its configuration and
//! the request adapter into scope.

// Core types - always available
pub use crate::config::{CacheConfig, MaintenanceConfig, SharedConfig};
pub use crate::error::{CacheError, Result, StorageError};
pub use crate::manager::{CacheManager, CacheStats, Invalidation};
pub use crate::policy::{CategoryPolicy, PolicyTable};

// Request-level helpers
pub use crate::key::{derive_key, RequestShape};
pub use crate::middleware::{CacheLayer, CacheStatus, CachedResponse, HandlerResponse};

// Tier abstraction
pub use crate::storage::{Tier, TierStore};

// Feature-gated exports
#[cfg(feature = "redis")]
pub use crate::redis_store::{RedisConfig, RedisStore};

#[cfg(feature = "telemetry")]
pub use crate::telemetry::init_logging;
