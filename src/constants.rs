//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for ponto-cache.
//!
//! All tier limits, policy defaults and maintenance periods live here so that
//! [`CacheConfig`](crate::config::CacheConfig) defaults and tests agree.

// ============================================================================
// Local Tier Constants
// ============================================================================

/// Default maximum number of entries held by the local (in-process) tier.
///
/// When full, the least-recently-set entry is evicted.
pub const DEFAULT_LOCAL_CAPACITY: usize = 2_000;

/// Default TTL for entries written without a category TTL (5 minutes).
pub const DEFAULT_TTL_SECS: u64 = 300;

// ============================================================================
// Key Derivation Constants
// ============================================================================

/// Maximum length of a derived cache key, in characters.
pub const MAX_KEY_LENGTH: usize = 64;

/// Identity used in key derivation when the request carries no caller identity.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Number of hash bytes kept in a derived key (128 bits).
pub const KEY_HASH_BYTES: usize = 16;

// ============================================================================
// Category Policy Constants
// ============================================================================

/// Category used when a caller passes an unknown category name.
pub const DEFAULT_CATEGORY: &str = "queries";

/// Invalidation dependency that matches every table.
pub const WILDCARD_DEPENDENCY: &str = "*";

// ============================================================================
// Entry Codec Constants
// ============================================================================

/// Format version written into every envelope.
pub const ENVELOPE_VERSION: &str = "1.0";

// ============================================================================
// Usage Tracking Constants
// ============================================================================

/// A key is hot once its frequency is strictly greater than this value.
pub const DEFAULT_HOT_KEY_THRESHOLD: u64 = 10;

/// Local TTL applied to hot keys by the maintenance pass (10 minutes).
///
/// Overrides the category TTL on purpose.
pub const DEFAULT_HOT_KEY_TTL_SECS: u64 = 600;

/// Usage patterns untouched for this long are pruned at checkpoint time (7 days).
pub const DEFAULT_USAGE_RETENTION_SECS: u64 = 7 * 24 * 3600;

/// Number of keys reported in `top_used_keys`.
pub const DEFAULT_TOP_KEYS: usize = 5;

/// File name of the usage checkpoint, relative to the cache directory.
pub const USAGE_CHECKPOINT_FILE: &str = "usage-patterns.json";

// ============================================================================
// Persistent Tier Constants
// ============================================================================

/// Default on-disk cache directory.
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// Extension of persistent-tier entry files.
pub const CACHE_FILE_EXTENSION: &str = "cache";

// ============================================================================
// Shared Tier Constants
// ============================================================================

/// Default Redis URL when none is configured.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Upper bound for a single shared-tier operation.
///
/// A timed out operation is treated as if the tier were unavailable.
pub const DEFAULT_SHARED_TIMEOUT_MS: u64 = 500;

/// At most one shared-tier failure is logged per window (5 seconds).
pub const FAILURE_LOG_WINDOW_SECS: u64 = 5;

/// Interval between shared-tier health probes while degraded.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 5;

// ============================================================================
// Maintenance Scheduler Constants
// ============================================================================

/// Persistent-tier expiry sweep period (1 hour).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3_600;

/// Usage checkpoint period (10 minutes).
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 600;

/// Hot-key TTL extension period (5 minutes).
pub const DEFAULT_HOT_KEY_INTERVAL_SECS: u64 = 300;

// ============================================================================
// Slow Operation Thresholds
// ============================================================================

/// `get` calls slower than this are logged at warn level.
pub const SLOW_GET_THRESHOLD_MS: u64 = 50;

/// `set` calls slower than this are logged at warn level.
pub const SLOW_SET_THRESHOLD_MS: u64 = 100;
