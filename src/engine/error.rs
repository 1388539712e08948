use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to decode {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("Invalid engine URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn decode(operation: &'static str, message: impl Into<String>) -> Self {
        EngineError::Decode {
            operation,
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
