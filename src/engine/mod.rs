//! Storage engine collaborators.
//!
//! The retention policy talks to the engine only through the traits in
//! [`traits`]: a synchronous routing table lookup, an asynchronous shard stats
//! fetch and an asynchronous delete-by-query. [`OpenSearchClient`] implements
//! all three over the REST API.

mod error;
mod http;
pub mod retry;
mod topology;
pub mod traits;

pub use error::{EngineError, EngineResult};
pub use http::OpenSearchClient;
pub use topology::RoutingTableCache;
pub use traits::{
    ClusterTopology, DeleteByQueryClient, DeleteByQueryRequest, DeleteByQueryResponse,
    IndexStatsClient, ShardSizeSample,
};
