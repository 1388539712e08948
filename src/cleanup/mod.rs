//! Shard-size triggered document cleanup.
//!
//! [`ShardSizeRetentionPolicy`] checks whether an index exists, measures its
//! shard store sizes and, when any shard is larger than the configured limit,
//! deletes the index's documents with a delete-by-query request. It does not
//! schedule itself; see [`crate::retention`] for the periodic worker.

mod error;
mod policy;
mod query;

pub use error::{CleanupError, CleanupResult};
pub use policy::{CleanupOutcome, RetentionRequest, ShardSizeRetentionPolicy};
pub use query::QueryFilter;
