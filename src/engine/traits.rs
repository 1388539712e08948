use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::EngineResult;
use crate::cleanup::QueryFilter;

/// Store sizes of every shard copy of one index, as reported by the engine.
///
/// Consumed once by the retention policy; never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardSizeSample {
    /// Store size in bytes per shard copy (primaries and replicas).
    pub shard_sizes: Vec<u64>,
}

impl ShardSizeSample {
    pub fn new(shard_sizes: Vec<u64>) -> Self {
        Self { shard_sizes }
    }

    /// Size of the largest shard copy, or `None` when the index reported no shards.
    pub fn largest(&self) -> Option<u64> {
        self.shard_sizes.iter().copied().max()
    }
}

/// A delete-by-query request scoped to a single index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteByQueryRequest {
    /// Target index.
    #[serde(skip)]
    pub index: String,
    /// Documents matching this query are deleted.
    pub query: QueryFilter,
    /// Refresh affected shards once the request completes.
    #[serde(skip)]
    pub refresh: bool,
    /// Tolerate missing or closed indices instead of failing.
    #[serde(skip)]
    pub lenient: bool,
}

impl DeleteByQueryRequest {
    /// Build a request for `index`; a missing query matches every document.
    pub fn new(index: impl Into<String>, query: Option<QueryFilter>) -> Self {
        Self {
            index: index.into(),
            query: query.unwrap_or_else(QueryFilter::match_all),
            refresh: true,
            lenient: true,
        }
    }
}

/// Engine acknowledgement of a delete-by-query request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeleteByQueryResponse {
    /// Number of documents deleted.
    #[serde(default)]
    pub deleted: u64,
    /// Documents skipped because they changed while the request ran.
    #[serde(default)]
    pub version_conflicts: u64,
}

/// Read-only view of the cluster routing table.
///
/// Lookups are answered from in-memory state and never block on the network.
pub trait ClusterTopology: Send + Sync {
    /// Whether `index` is currently present in the routing table.
    fn has_index(&self, index: &str) -> bool;
}

/// Fetches store statistics for an index's shards.
#[async_trait]
pub trait IndexStatsClient: Send + Sync {
    async fn shard_store_sizes(&self, index: &str) -> EngineResult<ShardSizeSample>;
}

/// Submits delete-by-query requests.
///
/// Retry policy, if any, belongs to the implementation.
#[async_trait]
pub trait DeleteByQueryClient: Send + Sync {
    async fn delete_by_query(
        &self,
        request: DeleteByQueryRequest,
    ) -> EngineResult<DeleteByQueryResponse>;
}
