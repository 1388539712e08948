use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    error::{CleanupError, CleanupResult},
    query::QueryFilter,
};
use crate::engine::{ClusterTopology, DeleteByQueryClient, DeleteByQueryRequest, IndexStatsClient};

/// Inputs of a single retention evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionRequest {
    /// Target index.
    pub index: String,
    /// A shard strictly larger than this many bytes triggers cleanup.
    pub max_shard_size_bytes: u64,
    /// Documents to delete on cleanup; `None` deletes every document.
    pub query: Option<QueryFilter>,
}

impl RetentionRequest {
    pub fn new(index: impl Into<String>, max_shard_size_bytes: u64) -> Self {
        Self {
            index: index.into(),
            max_shard_size_bytes,
            query: None,
        }
    }

    pub fn with_query(mut self, query: QueryFilter) -> Self {
        self.query = Some(query);
        self
    }
}

/// Result of a retention evaluation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The index is not in the routing table; nothing was fetched or deleted.
    IndexMissing,
    /// No shard exceeded the limit; nothing was deleted.
    UnderThreshold { largest_shard_bytes: u64 },
    /// A shard exceeded the limit and a delete-by-query completed.
    Cleaned {
        largest_shard_bytes: u64,
        deleted: u64,
    },
}

impl CleanupOutcome {
    /// Whether a delete request was issued.
    pub fn cleanup_performed(&self) -> bool {
        matches!(self, CleanupOutcome::Cleaned { .. })
    }

    /// Number of documents deleted (zero unless cleaned).
    pub fn deleted(&self) -> u64 {
        match self {
            CleanupOutcome::Cleaned { deleted, .. } => *deleted,
            _ => 0,
        }
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupOutcome::IndexMissing => "index_missing",
            CleanupOutcome::UnderThreshold { .. } => "under_threshold",
            CleanupOutcome::Cleaned { .. } => "cleaned",
        }
    }
}

/// Deletes documents from an index once any of its shards outgrows a limit.
///
/// The policy is stateless: every call works only on its own request and the
/// injected collaborators. Concurrent calls for the same index are not
/// serialized, so two overlapping calls may both observe an oversized shard
/// and both issue the delete. Deleting the same documents twice is harmless.
///
/// No retries or timeouts are applied here; both come from the injected
/// clients. Dropping the returned future abandons the evaluation.
#[derive(Clone)]
pub struct ShardSizeRetentionPolicy {
    topology: Arc<dyn ClusterTopology>,
    stats: Arc<dyn IndexStatsClient>,
    deleter: Arc<dyn DeleteByQueryClient>,
}

impl ShardSizeRetentionPolicy {
    pub fn new(
        topology: Arc<dyn ClusterTopology>,
        stats: Arc<dyn IndexStatsClient>,
        deleter: Arc<dyn DeleteByQueryClient>,
    ) -> Self {
        Self {
            topology,
            stats,
            deleter,
        }
    }

    /// Build a policy backed by one client that provides every collaborator.
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: ClusterTopology + IndexStatsClient + DeleteByQueryClient + 'static,
    {
        Self::new(client.clone(), client.clone(), client)
    }

    /// Whether the routing table currently knows `index`.
    pub fn has_index(&self, index: &str) -> bool {
        self.topology.has_index(index)
    }

    /// Check the index's shard sizes and delete matching documents when any
    /// shard is larger than `request.max_shard_size_bytes`.
    ///
    /// A missing index is not an error: it yields [`CleanupOutcome::IndexMissing`]
    /// without touching the engine. Stats and delete failures are returned
    /// unchanged.
    pub async fn evaluate_and_clean(
        &self,
        request: &RetentionRequest,
    ) -> CleanupResult<CleanupOutcome> {
        let Some(largest_shard_bytes) = self.largest_shard_size(&request.index).await? else {
            return Ok(CleanupOutcome::IndexMissing);
        };

        if largest_shard_bytes <= request.max_shard_size_bytes {
            debug!(
                index = %request.index,
                largest_shard_bytes,
                max_shard_size_bytes = request.max_shard_size_bytes,
                "Shard size is under limit"
            );
            return Ok(CleanupOutcome::UnderThreshold {
                largest_shard_bytes,
            });
        }

        debug!(
            index = %request.index,
            largest_shard_bytes,
            max_shard_size_bytes = request.max_shard_size_bytes,
            "Shard size exceeds limit, deleting documents"
        );

        let deleted = self
            .delete_docs_by_query(&request.index, request.query.clone())
            .await?;

        Ok(CleanupOutcome::Cleaned {
            largest_shard_bytes,
            deleted,
        })
    }

    /// Size in bytes of the index's largest shard copy.
    ///
    /// Returns `None` when the index is not in the routing table. An index that
    /// reports no shards measures as zero.
    pub async fn largest_shard_size(&self, index: &str) -> CleanupResult<Option<u64>> {
        if !self.topology.has_index(index) {
            debug!("skip as the index:{} doesn't exist", index);
            return Ok(None);
        }

        let sample = self
            .stats
            .shard_store_sizes(index)
            .await
            .map_err(|source| CleanupError::Stats {
                index: index.to_string(),
                source,
            })?;

        Ok(Some(sample.largest().unwrap_or(0)))
    }

    /// Delete documents matching `query` (every document when `None`) from
    /// `index`, returning the number deleted.
    pub async fn delete_docs_by_query(
        &self,
        index: &str,
        query: Option<QueryFilter>,
    ) -> CleanupResult<u64> {
        let response = self
            .deleter
            .delete_by_query(DeleteByQueryRequest::new(index, query))
            .await
            .map_err(|source| CleanupError::Delete {
                index: index.to_string(),
                source,
            })?;

        // Zero deleted means the query matched nothing.
        info!("{} docs are deleted for index:{}", response.deleted, index);
        if response.version_conflicts > 0 {
            warn!(
                index,
                version_conflicts = response.version_conflicts,
                "Documents changed during delete-by-query and were not deleted"
            );
        }

        Ok(response.deleted)
    }
}

impl std::fmt::Debug for ShardSizeRetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSizeRetentionPolicy").finish_non_exhaustive()
    }
}
