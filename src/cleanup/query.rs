use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// An engine query in JSON query DSL form.
///
/// The policy treats the query as opaque and hands it to the delete client
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryFilter(Value);

impl QueryFilter {
    /// Matches every document in the index.
    pub fn match_all() -> Self {
        Self(json!({ "match_all": {} }))
    }

    /// Matches documents whose `field` holds an epoch-millis timestamp at or
    /// before `cutoff`.
    pub fn older_than(field: &str, cutoff: DateTime<Utc>) -> Self {
        Self(json!({
            "bool": {
                "filter": [{
                    "range": {
                        field: {
                            "lte": cutoff.timestamp_millis(),
                            "format": "epoch_millis"
                        }
                    }
                }]
            }
        }))
    }

    /// Wrap a caller-provided query.
    pub fn from_json(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }
}
