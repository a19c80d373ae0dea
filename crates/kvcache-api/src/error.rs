//! # API Error Types
//!
//! Unified error handling for the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kvcache_client::CacheError;
use thiserror::Error;

use crate::response::ErrorBody;

/// API-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Entity not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(entity_type: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    /// Get HTTP status code for this error
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidInput(_)
            | Self::Cache(CacheError::InvalidArgument(_) | CacheError::Serialization(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Cache(CacheError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Cache(
                CacheError::MalformedDescriptor(_)
                | CacheError::HandshakeFailed(_)
                | CacheError::Cancelled,
            ) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Cache(CacheError::Store(_)) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }
        ErrorBody::new(status, self.to_string()).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
