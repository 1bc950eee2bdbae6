//! Error types for the HTTP service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cmdlens_core::{ConfigError, ExplainError, GatewayError};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Failures starting or running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend client error: {0}")]
    Backend(#[from] ExplainError),

    #[error("HTTP server error: {0}")]
    HttpServer(String),
}

impl ServerError {
    /// Startup failures are reported as the gateway's fatal configuration error.
    pub fn into_gateway_error(self) -> GatewayError {
        match self {
            ServerError::Config(e) => e.into(),
            other => GatewayError::ConfigurationMissing(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Request-level failures, rendered as `{"error": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Server is shutting down")]
    Cancelled,

    #[error("Request did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        // The orchestrator only fails a whole request when it is cancelled.
        tracing::debug!("Request ended early: {}", e);
        ApiError::Cancelled
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
