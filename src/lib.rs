//! Shard-size triggered retention for OpenSearch-compatible search engines.
//!
//! [`cleanup::ShardSizeRetentionPolicy`] checks whether any shard of an index
//! has grown past a byte limit and, if so, deletes documents matching a query.
//! [`retention`] schedules that policy per configured index, and [`engine`]
//! provides the REST client it runs against.

pub mod cleanup;
pub mod config;
pub mod engine;
pub mod observability;
pub mod retention;

pub use cleanup::{CleanupError, CleanupOutcome, QueryFilter, RetentionRequest, ShardSizeRetentionPolicy};
pub use config::{ConfigError, ShardkeeperConfig};
pub use engine::OpenSearchClient;
