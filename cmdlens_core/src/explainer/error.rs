use std::time::Duration;
use thiserror::Error;

use crate::error::GatewayError;
use crate::retry::Retryable;

/// Failures of a single explanation or generation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplainError {
    #[error("Failed to reach generative backend: {0}")]
    Connect(String),

    #[error("Generative backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream ended before any usable fragment: {0}")]
    Truncated(String),

    #[error("Generative backend returned no text")]
    Empty,

    /// The stream carried an `error` record and no text.
    #[error("Generative backend reported an error: {0}")]
    Backend(String),

    #[error("Generative backend did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Invalid generative backend address: {0}")]
    InvalidUrl(String),
}

impl ExplainError {
    pub fn to_gateway_error(&self) -> GatewayError {
        match self {
            ExplainError::Connect(_)
            | ExplainError::Status { .. }
            | ExplainError::Timeout(_)
            | ExplainError::InvalidUrl(_) => GatewayError::StreamConnectFailed(self.to_string()),
            ExplainError::Truncated(_) | ExplainError::Empty | ExplainError::Backend(_) => {
                GatewayError::StreamTruncated(self.to_string())
            }
        }
    }
}

impl Retryable for ExplainError {
    fn is_retryable(&self) -> bool {
        match self {
            ExplainError::Connect(_) | ExplainError::Truncated(_) | ExplainError::Timeout(_) => {
                true
            }
            ExplainError::Status { status, .. } => *status >= 500,
            ExplainError::Empty | ExplainError::Backend(_) | ExplainError::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for ExplainError {
    fn from(e: reqwest::Error) -> Self {
        ExplainError::Connect(e.to_string())
    }
}
