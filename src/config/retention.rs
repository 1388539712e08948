//! Index retention configuration.
//!
//! Configures which indices are kept under their shard-size limit and how
//! aggressively old documents are removed.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_secs = 3600
//!
//! [[retention.indices]]
//! index = ".checkpoints"
//! max_shard_size_bytes = 53687091200
//! ttl_days = 3
//! timestamp_field = "timestamp"
//! max_ttl_reductions = 10
//! ```

use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Largest accepted `ttl_days` (100 years).
pub const MAX_TTL_DAYS: u32 = 36_500;

/// Retention worker configuration.
///
/// When enabled, a background worker periodically checks every configured
/// index and deletes documents from those whose shards grew past the limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether the retention worker runs.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run a retention pass (in seconds).
    /// Default: 3600 (hourly)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// If true, measure and log what would be deleted without deleting.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Indices under retention.
    #[serde(default)]
    pub indices: Vec<IndexRetentionConfig>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            dry_run: false,
            indices: Vec::new(),
        }
    }
}

fn default_interval_secs() -> u64 {
    3600
}

/// Retention settings for a single index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IndexRetentionConfig {
    /// Name of the index.
    pub index: String,

    /// Maximum store size of any single shard, in bytes.
    /// A shard strictly larger than this triggers cleanup.
    /// Default: 50 GiB
    #[serde(default = "default_max_shard_size_bytes")]
    pub max_shard_size_bytes: u64,

    /// Age in days after which documents are deleted unconditionally.
    /// When unset, cleanup deletes all documents once the shard limit is exceeded.
    #[serde(default)]
    pub ttl_days: Option<u32>,

    /// Epoch-millis timestamp field used for age-based queries.
    /// Default: "timestamp"
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// How many times the TTL is shortened by a day while shards stay oversized.
    /// Default: 10
    #[serde(default = "default_max_ttl_reductions")]
    pub max_ttl_reductions: u32,
}

fn default_max_shard_size_bytes() -> u64 {
    50 * 1024 * 1024 * 1024
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

fn default_max_ttl_reductions() -> u32 {
    10
}

impl IndexRetentionConfig {
    /// Create a size-only retention entry with defaults for everything else.
    pub fn new(index: impl Into<String>, max_shard_size_bytes: u64) -> Self {
        Self {
            index: index.into(),
            max_shard_size_bytes,
            ttl_days: None,
            timestamp_field: default_timestamp_field(),
            max_ttl_reductions: default_max_ttl_reductions(),
        }
    }

    /// The configured TTL as a duration.
    pub fn ttl(&self) -> Option<chrono::Duration> {
        self.ttl_days.map(|days| chrono::Duration::days(days as i64))
    }
}

impl RetentionConfig {
    /// Get the interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Check if any index is configured.
    pub fn has_any_index(&self) -> bool {
        !self.indices.is_empty()
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "retention.interval_secs must be greater than 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.indices {
            if entry.index.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "retention.indices entries require a non-empty index name".into(),
                ));
            }
            if !seen.insert(entry.index.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "retention index '{}' is configured more than once",
                    entry.index
                )));
            }
            if entry.ttl_days == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "retention index '{}': ttl_days must be at least 1",
                    entry.index
                )));
            }
            if entry.ttl_days.is_some_and(|days| days > MAX_TTL_DAYS) {
                return Err(ConfigError::Validation(format!(
                    "retention index '{}': ttl_days must be at most {}",
                    entry.index, MAX_TTL_DAYS
                )));
            }
            if entry.ttl_days.is_some() && entry.timestamp_field.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "retention index '{}': timestamp_field is required with ttl_days",
                    entry.index
                )));
            }
        }

        Ok(())
    }
}
