use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Failed to fetch shard store stats for index {index}: {source}")]
    Stats {
        index: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to delete documents from index {index}: {source}")]
    Delete {
        index: String,
        #[source]
        source: EngineError,
    },
}

impl CleanupError {
    /// The index the failed request targeted.
    pub fn index(&self) -> &str {
        match self {
            CleanupError::Stats { index, .. } | CleanupError::Delete { index, .. } => index,
        }
    }
}

pub type CleanupResult<T> = Result<T, CleanupError>;
