//! Retention worker for enforcing per-index retention.
//!
//! Each pass reloads the routing table, then runs every configured index job
//! in order. A failing job is logged and counted; the remaining jobs still run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::job::{IndexRetentionJob, IndexRetentionResult};
use crate::{
    cleanup::{CleanupError, ShardSizeRetentionPolicy},
    config::RetentionConfig,
    engine::OpenSearchClient,
    observability::metrics,
};

/// Results from a single retention run.
#[derive(Debug, Default)]
pub struct RetentionRunResult {
    /// One entry per job that completed.
    pub indices: Vec<IndexRetentionResult>,
    /// Jobs that failed, in run order.
    pub failures: Vec<CleanupError>,
}

impl RetentionRunResult {
    /// Total number of documents deleted across all indices.
    pub fn total(&self) -> u64 {
        self.indices
            .iter()
            .map(IndexRetentionResult::total_deleted)
            .fold(0, u64::saturating_add)
    }

    /// Check if any documents were deleted.
    pub fn has_deletions(&self) -> bool {
        self.total() > 0
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Number of configured indices missing from the cluster.
    pub fn skipped(&self) -> usize {
        self.indices.iter().filter(|r| r.skipped_missing).count()
    }
}

/// Build one job per configured index, all sharing `policy`.
pub fn build_jobs(
    policy: &ShardSizeRetentionPolicy,
    config: &RetentionConfig,
) -> Vec<IndexRetentionJob> {
    config
        .indices
        .iter()
        .map(|index| IndexRetentionJob::new(policy.clone(), index.clone()))
        .collect()
}

/// Run every job once, sequentially.
pub async fn run_retention(jobs: &[IndexRetentionJob], dry_run: bool) -> RetentionRunResult {
    let mut result = RetentionRunResult::default();

    for job in jobs {
        match job.run(dry_run).await {
            Ok(index_result) => {
                if index_result.has_deletions() {
                    tracing::debug!(
                        index = %index_result.index,
                        age_deleted = index_result.age_deleted,
                        size_deleted = index_result.size_deleted,
                        size_passes = index_result.size_passes,
                        "Index retention complete"
                    );
                }
                result.indices.push(index_result);
            }
            Err(e) => {
                tracing::error!(index = %job.index(), error = %e, "Error running index retention");
                metrics::record_retention_error(job.index());
                result.failures.push(e);
            }
        }
    }

    result
}

/// Refresh the routing table and run a single retention pass.
pub async fn run_once(client: &Arc<OpenSearchClient>, config: &RetentionConfig) -> RetentionRunResult {
    match client.refresh_topology().await {
        Ok(count) => tracing::debug!(indices = count, "Routing table refreshed"),
        Err(e) => {
            // Indices seen in an earlier refresh are still evaluated.
            tracing::warn!(
                error = %e,
                known_indices = client.routing_table().index_count(),
                "Failed to refresh routing table, using previous snapshot"
            );
        }
    }

    let policy = ShardSizeRetentionPolicy::from_client(client.clone());
    let jobs = build_jobs(&policy, config);
    run_retention(&jobs, config.dry_run).await
}

/// Starts the retention worker.
///
/// Runs a pass immediately, then one every `interval_secs` until `shutdown`
/// is cancelled. A pass in progress is abandoned on cancellation.
pub async fn start_retention_worker(
    client: Arc<OpenSearchClient>,
    config: RetentionConfig,
    shutdown: CancellationToken,
) {
    if !config.enabled {
        tracing::info!("Retention worker disabled by configuration");
        return;
    }

    if !config.has_any_index() {
        tracing::info!("Retention worker enabled but no indices configured");
        return;
    }

    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };

    tracing::info!(
        interval_secs = config.interval_secs,
        indices = config.indices.len(),
        dry_run = config.dry_run,
        "Starting retention worker{}",
        dry_run_msg
    );

    let interval = config.interval();

    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = run_once(&client, &config) => result,
        };

        log_summary(&result, config.dry_run);

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Retention worker stopped");
}

fn log_summary(result: &RetentionRunResult, dry_run: bool) {
    let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };

    if result.has_deletions() || result.has_failures() {
        tracing::info!(
            indices = result.indices.len(),
            skipped = result.skipped(),
            failed = result.failures.len(),
            total = result.total(),
            "Retention run complete{}",
            dry_run_msg
        );
    } else {
        tracing::debug!(
            indices = result.indices.len(),
            skipped = result.skipped(),
            "Retention run complete, no documents to delete{}",
            dry_run_msg
        );
    }
}
