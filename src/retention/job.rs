use chrono::{DateTime, Duration, Utc};

use crate::{
    cleanup::{CleanupOutcome, CleanupResult, QueryFilter, RetentionRequest, ShardSizeRetentionPolicy},
    config::IndexRetentionConfig,
    observability::metrics,
};

/// What one retention pass did to one index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRetentionResult {
    pub index: String,
    /// Documents deleted for being older than the TTL.
    pub age_deleted: u64,
    /// Number of shard-size evaluations performed.
    pub size_passes: u32,
    /// Documents deleted because a shard exceeded the limit.
    pub size_deleted: u64,
    /// Whether any evaluation found a shard over the limit.
    pub over_threshold: bool,
    /// The index was not in the routing table; nothing was done.
    pub skipped_missing: bool,
    /// Largest shard copy seen by the last evaluation.
    pub largest_shard_bytes: Option<u64>,
}

impl IndexRetentionResult {
    fn new(index: &str) -> Self {
        Self {
            index: index.to_string(),
            ..Default::default()
        }
    }

    pub fn total_deleted(&self) -> u64 {
        self.age_deleted.saturating_add(self.size_deleted)
    }

    pub fn has_deletions(&self) -> bool {
        self.total_deleted() > 0
    }
}

/// Retention for a single index: an age-based delete followed by shard-size
/// cleanup that walks the TTL back one day at a time.
#[derive(Debug, Clone)]
pub struct IndexRetentionJob {
    policy: ShardSizeRetentionPolicy,
    config: IndexRetentionConfig,
}

impl IndexRetentionJob {
    pub fn new(policy: ShardSizeRetentionPolicy, config: IndexRetentionConfig) -> Self {
        Self { policy, config }
    }

    pub fn index(&self) -> &str {
        &self.config.index
    }

    pub async fn run(&self, dry_run: bool) -> CleanupResult<IndexRetentionResult> {
        self.run_at(Utc::now(), dry_run).await
    }

    /// Run one pass using `now` as the reference time for every cutoff.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> CleanupResult<IndexRetentionResult> {
        let index = self.config.index.as_str();
        let mut result = IndexRetentionResult::new(index);

        if !self.policy.has_index(index) {
            tracing::debug!(index, "Index not found in routing table, skipping retention");
            result.skipped_missing = true;
            return Ok(result);
        }

        if dry_run {
            return self.probe(now, result).await;
        }

        if let Some(ttl) = self.config.ttl() {
            let cutoff = cutoff_before(now, ttl);
            let deleted = self
                .policy
                .delete_docs_by_query(index, Some(self.older_than(cutoff)))
                .await?;
            if deleted > 0 {
                tracing::debug!(index, deleted, cutoff = %cutoff, "Deleted expired documents");
                metrics::record_retention_deletion(index, "age", deleted);
            }
            result.age_deleted = deleted;
        }

        self.shrink_to_limit(now, &mut result).await?;

        Ok(result)
    }

    /// Evaluate shard sizes, deleting progressively younger documents while
    /// a shard stays over the limit.
    async fn shrink_to_limit(
        &self,
        now: DateTime<Utc>,
        result: &mut IndexRetentionResult,
    ) -> CleanupResult<()> {
        let index = self.config.index.as_str();
        let ttl = self.config.ttl();
        let mut reductions: u32 = 0;

        loop {
            let step_ttl = ttl.map(|ttl| reduced_ttl(ttl, reductions + 1));
            let mut request = RetentionRequest::new(index, self.config.max_shard_size_bytes);
            if let Some(step_ttl) = step_ttl {
                request = request.with_query(self.older_than(cutoff_before(now, step_ttl)));
            }

            let outcome = self.policy.evaluate_and_clean(&request).await?;
            result.size_passes += 1;
            metrics::record_retention_evaluation(index, outcome.as_str());

            match outcome {
                CleanupOutcome::IndexMissing => {
                    result.skipped_missing = true;
                    return Ok(());
                }
                CleanupOutcome::UnderThreshold {
                    largest_shard_bytes,
                } => {
                    result.largest_shard_bytes = Some(largest_shard_bytes);
                    metrics::record_largest_shard_bytes(index, largest_shard_bytes);
                    return Ok(());
                }
                CleanupOutcome::Cleaned {
                    largest_shard_bytes,
                    deleted,
                } => {
                    result.largest_shard_bytes = Some(largest_shard_bytes);
                    result.over_threshold = true;
                    result.size_deleted = result.size_deleted.saturating_add(deleted);
                    metrics::record_largest_shard_bytes(index, largest_shard_bytes);
                    if deleted > 0 {
                        metrics::record_retention_deletion(index, "shard_size", deleted);
                    }
                }
            }

            // Without a TTL the first cleanup already matched every document.
            let Some(step_ttl) = step_ttl else {
                return Ok(());
            };

            if reductions >= self.config.max_ttl_reductions || step_ttl <= Duration::zero() {
                tracing::warn!(
                    index,
                    reductions,
                    max_shard_size_bytes = self.config.max_shard_size_bytes,
                    largest_shard_bytes = result.largest_shard_bytes,
                    "Shard size still exceeds limit after reaching max TTL reductions"
                );
                return Ok(());
            }

            reductions += 1;
        }
    }

    async fn probe(
        &self,
        now: DateTime<Utc>,
        mut result: IndexRetentionResult,
    ) -> CleanupResult<IndexRetentionResult> {
        let index = self.config.index.as_str();

        if let Some(ttl) = self.config.ttl() {
            let cutoff = cutoff_before(now, ttl);
            tracing::info!(
                index,
                cutoff = %cutoff,
                "DRY RUN: Would delete documents older than {}",
                cutoff
            );
        }

        let Some(largest_shard_bytes) = self.policy.largest_shard_size(index).await? else {
            result.skipped_missing = true;
            return Ok(result);
        };
        result.largest_shard_bytes = Some(largest_shard_bytes);
        metrics::record_largest_shard_bytes(index, largest_shard_bytes);

        if largest_shard_bytes > self.config.max_shard_size_bytes {
            result.over_threshold = true;
            tracing::info!(
                index,
                largest_shard_bytes,
                max_shard_size_bytes = self.config.max_shard_size_bytes,
                "DRY RUN: Would delete documents to shrink oversized shard"
            );
        }

        Ok(result)
    }

    fn older_than(&self, cutoff: DateTime<Utc>) -> QueryFilter {
        QueryFilter::older_than(&self.config.timestamp_field, cutoff)
    }
}

/// `now - ttl`, clamped to the earliest representable instant.
fn cutoff_before(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `ttl` shortened by `days`, never below zero.
fn reduced_ttl(ttl: Duration, days: u32) -> Duration {
    (ttl - Duration::days(i64::from(days))).max(Duration::zero())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::engine::test::FakeEngine;

    const LIMIT: u64 = 1_000;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn job(engine: &Arc<FakeEngine>, config: IndexRetentionConfig) -> IndexRetentionJob {
        IndexRetentionJob::new(ShardSizeRetentionPolicy::from_client(engine.clone()), config)
    }

    fn ttl_config(ttl_days: u32, max_ttl_reductions: u32) -> IndexRetentionConfig {
        IndexRetentionConfig {
            ttl_days: Some(ttl_days),
            max_ttl_reductions,
            ..IndexRetentionConfig::new("checkpoints", LIMIT)
        }
    }

    fn cutoff_millis(request: &crate::engine::DeleteByQueryRequest) -> i64 {
        request.query.as_json()["bool"]["filter"][0]["range"]["timestamp"]["lte"]
            .as_i64()
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_index_is_skipped() {
        let engine = Arc::new(FakeEngine::new());
        let result = job(&engine, ttl_config(3, 10)).run_at(now(), false).await.unwrap();

        assert!(result.skipped_missing);
        assert!(engine.stats_calls().is_empty());
        assert!(engine.delete_requests().is_empty());
    }

    #[tokio::test]
    async fn test_ttl_delete_then_single_size_check() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_index("checkpoints", vec![10, 20])
                .with_deleted_count(7),
        );

        let result = job(&engine, ttl_config(3, 10)).run_at(now(), false).await.unwrap();

        assert_eq!(result.age_deleted, 7);
        assert_eq!(result.size_passes, 1);
        assert_eq!(result.size_deleted, 0);
        assert!(!result.over_threshold);
        assert_eq!(result.largest_shard_bytes, Some(20));

        let requests = engine.delete_requests();
        assert_eq!(requests.len(), 1);
        let expected = (now() - Duration::days(3)).timestamp_millis();
        assert_eq!(cutoff_millis(&requests[0]), expected);
    }

    #[tokio::test]
    async fn test_oversized_shard_steps_ttl_back_until_under_limit() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_index_samples("checkpoints", vec![vec![5_000], vec![2_000], vec![500]])
                .with_deleted_count(4),
        );

        let result = job(&engine, ttl_config(3, 10)).run_at(now(), false).await.unwrap();

        assert_eq!(result.size_passes, 3);
        assert!(result.over_threshold);
        assert_eq!(result.size_deleted, 8);
        assert_eq!(result.total_deleted(), 12);
        assert_eq!(result.largest_shard_bytes, Some(500));

        // Age delete at 3 days, then size cleanups at 2 and 1 days.
        let cutoffs: Vec<i64> = engine.delete_requests().iter().map(cutoff_millis).collect();
        let days_back = |days: i64| (now() - Duration::days(days)).timestamp_millis();
        assert_eq!(cutoffs, vec![days_back(3), days_back(2), days_back(1)]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stops_and_warns_at_max_ttl_reductions() {
        let engine = Arc::new(FakeEngine::new().with_index("checkpoints", vec![5_000]));

        let result = job(&engine, ttl_config(30, 2)).run_at(now(), false).await.unwrap();

        // One initial evaluation plus two reductions.
        assert_eq!(result.size_passes, 3);
        assert_eq!(engine.delete_requests().len(), 4);
        assert!(logs_contain("max TTL reductions"));
    }

    #[tokio::test]
    async fn test_ttl_reduction_stops_at_zero() {
        let engine = Arc::new(FakeEngine::new().with_index("checkpoints", vec![5_000]));

        let result = job(&engine, ttl_config(2, 10)).run_at(now(), false).await.unwrap();

        // Cutoffs at 1 day and then 0 days; nothing younger is left to try.
        assert_eq!(result.size_passes, 2);
        let last = engine.delete_requests().pop().unwrap();
        assert_eq!(cutoff_millis(&last), now().timestamp_millis());
    }

    #[tokio::test]
    async fn test_without_ttl_deletes_everything_once() {
        let engine = Arc::new(FakeEngine::new().with_index("checkpoints", vec![5_000]));
        let config = IndexRetentionConfig::new("checkpoints", LIMIT);

        let result = job(&engine, config).run_at(now(), false).await.unwrap();

        assert_eq!(result.size_passes, 1);
        assert_eq!(result.age_deleted, 0);
        let requests = engine.delete_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query.as_json(), &json!({ "match_all": {} }));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_dry_run_only_probes() {
        let engine = Arc::new(FakeEngine::new().with_index("checkpoints", vec![5_000]));

        let result = job(&engine, ttl_config(3, 10)).run_at(now(), true).await.unwrap();

        assert!(result.over_threshold);
        assert_eq!(result.largest_shard_bytes, Some(5_000));
        assert_eq!(result.size_passes, 0);
        assert!(!result.has_deletions());
        assert_eq!(engine.stats_calls(), vec!["checkpoints"]);
        assert!(engine.delete_requests().is_empty());
        assert!(logs_contain("DRY RUN"));
    }

    #[tokio::test]
    async fn test_age_delete_failure_is_returned() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_index("checkpoints", vec![10])
                .failing_deletes(),
        );

        let err = job(&engine, ttl_config(3, 10))
            .run_at(now(), false)
            .await
            .unwrap_err();

        assert_eq!(err.index(), "checkpoints");
        assert!(engine.stats_calls().is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow_cutoff() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_index("checkpoints", vec![10])
                .with_deleted_count(0),
        );
        let config = IndexRetentionConfig {
            ttl_days: Some(u32::MAX),
            ..IndexRetentionConfig::new("checkpoints", LIMIT)
        };

        let result = job(&engine, config).run_at(now(), false).await.unwrap();

        assert_eq!(result.age_deleted, 0);
        assert_eq!(result.size_passes, 1);
        let requests = engine.delete_requests();
        assert_eq!(cutoff_millis(&requests[0]), DateTime::<Utc>::MIN_UTC.timestamp_millis());
    }

    #[test]
    fn test_reduced_ttl_clamps_at_zero() {
        assert_eq!(reduced_ttl(Duration::days(3), 1), Duration::days(2));
        assert_eq!(reduced_ttl(Duration::days(3), 5), Duration::zero());
    }
}
