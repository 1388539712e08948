//! Scheduled retention for configured indices.
//!
//! Each configured index gets an [`IndexRetentionJob`] that:
//! 1. Deletes documents older than the index TTL, when one is set
//! 2. Deletes progressively younger documents while any shard stays over
//!    the size limit
//!
//! The background worker runs every job once per interval and supports a
//! dry-run mode that only measures.

mod job;
mod worker;

pub use job::{IndexRetentionJob, IndexRetentionResult};
pub use worker::{
    RetentionRunResult, build_jobs, run_once, run_retention, start_retention_worker,
};
