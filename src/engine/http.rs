//! REST client for OpenSearch and Elasticsearch compatible engines.
//!
//! Endpoints used:
//! - `GET /_cluster/state/routing_table` to refresh the cached routing table
//! - `GET /{index}/_stats/store?level=shards` for per-shard store sizes
//! - `POST /{index}/_delete_by_query` for document deletion

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use super::{
    ClusterTopology, DeleteByQueryClient, DeleteByQueryRequest, DeleteByQueryResponse,
    EngineError, EngineResult, IndexStatsClient, RoutingTableCache, ShardSizeSample,
    retry::with_retry,
};
use crate::config::{EngineConfig, RetryConfig};

#[derive(Debug, Deserialize)]
struct ClusterStateResponse {
    #[serde(default)]
    routing_table: RoutingTableSection,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingTableSection {
    #[serde(default)]
    indices: HashMap<String, serde::de::IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct IndicesStatsResponse {
    #[serde(default)]
    indices: HashMap<String, IndexStats>,
}

#[derive(Debug, Deserialize)]
struct IndexStats {
    #[serde(default)]
    shards: HashMap<String, Vec<ShardCopyStats>>,
}

#[derive(Debug, Deserialize)]
struct ShardCopyStats {
    #[serde(default)]
    store: Option<StoreStats>,
}

#[derive(Debug, Deserialize)]
struct StoreStats {
    size_in_bytes: u64,
}

/// Engine client backed by the REST API.
///
/// Implements every collaborator of the retention policy. Routing table
/// lookups are served from a cache that [`OpenSearchClient::refresh_topology`]
/// reloads.
pub struct OpenSearchClient {
    http: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    retry: RetryConfig,
    routing_table: RoutingTableCache,
}

impl OpenSearchClient {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(&config.url)?,
            username: config.username.clone(),
            password: config.password.clone(),
            retry: config.retry.clone(),
            routing_table: RoutingTableCache::new(),
        })
    }

    pub fn routing_table(&self) -> &RoutingTableCache {
        &self.routing_table
    }

    /// Reload the routing table from cluster state, returning the number of
    /// routable indices. The previous table is kept when the fetch fails.
    pub async fn refresh_topology(&self) -> EngineResult<usize> {
        let url = self.endpoint(&["_cluster", "state", "routing_table"])?;
        let state: ClusterStateResponse = self
            .send_json("cluster_state", || self.http.get(url.clone()))
            .await?;

        let count = state.routing_table.indices.len();
        self.routing_table
            .replace(state.routing_table.indices.into_keys());

        tracing::debug!(indices = count, "Refreshed routing table");
        Ok(count)
    }

    fn endpoint(&self, segments: &[&str]) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EngineError::Internal(format!("engine URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    async fn send_json<T, F>(&self, operation: &'static str, build: F) -> EngineResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let response =
            with_retry(&self.retry, operation, || self.authorize(build()).send()).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| EngineError::decode(operation, e.to_string()))
    }
}

impl ClusterTopology for OpenSearchClient {
    fn has_index(&self, index: &str) -> bool {
        self.routing_table.has_index(index)
    }
}

#[async_trait]
impl IndexStatsClient for OpenSearchClient {
    async fn shard_store_sizes(&self, index: &str) -> EngineResult<ShardSizeSample> {
        let mut url = self.endpoint(&[index, "_stats", "store"])?;
        url.query_pairs_mut().append_pair("level", "shards");

        let stats: IndicesStatsResponse = self
            .send_json("index_stats", || self.http.get(url.clone()))
            .await?;

        let shard_sizes = stats
            .indices
            .into_values()
            .flat_map(|index| index.shards.into_values())
            .flatten()
            .filter_map(|copy| copy.store.map(|store| store.size_in_bytes))
            .collect();

        Ok(ShardSizeSample::new(shard_sizes))
    }
}

#[async_trait]
impl DeleteByQueryClient for OpenSearchClient {
    async fn delete_by_query(
        &self,
        request: DeleteByQueryRequest,
    ) -> EngineResult<DeleteByQueryResponse> {
        let mut url = self.endpoint(&[request.index.as_str(), "_delete_by_query"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("refresh", if request.refresh { "true" } else { "false" });
            if request.lenient {
                query
                    .append_pair("ignore_unavailable", "true")
                    .append_pair("allow_no_indices", "true")
                    .append_pair("expand_wildcards", "open");
            }
        }

        let body = serde_json::to_vec(&request)
            .map_err(|e| EngineError::Internal(format!("failed to encode query: {}", e)))?;

        self.send_json("delete_by_query", || {
            self.http
                .post(url.clone())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{basic_auth, body_json, method, path, query_param},
    };

    use super::*;
    use crate::cleanup::QueryFilter;

    fn client_for(server: &MockServer) -> OpenSearchClient {
        let config = EngineConfig {
            url: server.uri(),
            retry: RetryConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        OpenSearchClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_topology_loads_routing_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/state/routing_table"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cluster_name": "test",
                "routing_table": {
                    "indices": {
                        ".checkpoints": { "shards": {} },
                        "results": { "shards": {} }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(!client.has_index(".checkpoints"));

        let count = client.refresh_topology().await.unwrap();

        assert_eq!(count, 2);
        assert!(client.has_index(".checkpoints"));
        assert!(client.has_index("results"));
        assert!(!client.has_index("other"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/state/routing_table"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.routing_table().replace(["results"]);

        let err = client.refresh_topology().await.unwrap_err();

        assert!(matches!(err, EngineError::Status { status: 500, .. }));
        assert!(client.has_index("results"));
    }

    #[tokio::test]
    async fn test_shard_store_sizes_collects_every_copy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/results/_stats/store"))
            .and(query_param("level", "shards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_shards": { "total": 3, "successful": 3, "failed": 0 },
                "indices": {
                    "results": {
                        "shards": {
                            "0": [
                                { "routing": { "primary": true }, "store": { "size_in_bytes": 1200 } },
                                { "routing": { "primary": false }, "store": { "size_in_bytes": 1100 } }
                            ],
                            "1": [
                                { "routing": { "primary": true }, "store": { "size_in_bytes": 300 } }
                            ]
                        }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut sample = client.shard_store_sizes("results").await.unwrap();
        sample.shard_sizes.sort_unstable();

        assert_eq!(sample.shard_sizes, vec![300, 1100, 1200]);
        assert_eq!(sample.largest(), Some(1200));
    }

    #[tokio::test]
    async fn test_stats_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing/_stats/store"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"index_not_found"}"#),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.shard_store_sizes("missing").await.unwrap_err();

        match err {
            EngineError::Status {
                operation,
                status,
                body,
            } => {
                assert_eq!(operation, "index_stats");
                assert_eq!(status, 404);
                assert!(body.contains("index_not_found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_stats_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/results/_stats/store"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.shard_store_sizes("results").await.unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_delete_by_query_sends_scoped_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/results/_delete_by_query"))
            .and(query_param("refresh", "true"))
            .and(query_param("ignore_unavailable", "true"))
            .and(query_param("expand_wildcards", "open"))
            .and(body_json(json!({ "query": { "match_all": {} } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 12,
                "timed_out": false,
                "total": 40,
                "deleted": 40,
                "version_conflicts": 2,
                "failures": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client
            .delete_by_query(DeleteByQueryRequest::new("results", None))
            .await
            .unwrap();

        assert_eq!(response.deleted, 40);
        assert_eq!(response.version_conflicts, 2);
    }

    #[tokio::test]
    async fn test_delete_by_query_forwards_filter() {
        let server = MockServer::start().await;
        let query = QueryFilter::from_json(json!({ "term": { "detector_id": "abc" } }));
        Mock::given(method("POST"))
            .and(path("/results/_delete_by_query"))
            .and(body_json(json!({ "query": { "term": { "detector_id": "abc" } } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "deleted": 3 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client
            .delete_by_query(DeleteByQueryRequest::new("results", Some(query)))
            .await
            .unwrap();

        assert_eq!(response.deleted, 3);
    }

    #[tokio::test]
    async fn test_basic_auth_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/state/routing_table"))
            .and(basic_auth("retention", "hunter2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "routing_table": { "indices": {} } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = EngineConfig {
            url: server.uri(),
            username: Some("retention".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let client = OpenSearchClient::new(&config).unwrap();

        assert_eq!(client.refresh_topology().await.unwrap(), 0);
    }

    #[test]
    fn test_endpoint_encodes_segments_under_base_path() {
        let config = EngineConfig {
            url: "http://search.internal:9200/proxy/".into(),
            ..Default::default()
        };
        let client = OpenSearchClient::new(&config).unwrap();
        let url = client.endpoint(&["logs 2024", "_stats", "store"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://search.internal:9200/proxy/logs%202024/_stats/store"
        );
    }
}
