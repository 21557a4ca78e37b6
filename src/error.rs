//! Error types for the cache store
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::repository::RepositoryError;

// == Store Error Enum ==
/// Unified error type for the cache store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The repository or its session cannot be used
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The configured cache root does not exist in the repository
    #[error("Cache root does not exist: {0}")]
    BucketPath(String),

    /// The payload or key could not be captured at write time
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A persisted entry could not be read back
    #[error("Corrupt entry at {path}: {reason}")]
    Deserialization { path: String, reason: String },

    /// A commit was rejected by the repository
    #[error("Commit failed: {0}")]
    Commit(#[source] RepositoryError),

    /// The payload exceeds the configured maximum store size
    #[error("Entry of {size} bytes exceeds maximum store size of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    /// No entry matches an administrative lookup
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rejected store configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Any other repository failure
    #[error("Repository error: {0}")]
    Repository(#[source] RepositoryError),
}

impl From<RepositoryError> for StoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(msg) => StoreError::StoreUnavailable(msg),
            other => StoreError::Repository(other),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidRequest(_) | StoreError::Serialization(_) => StatusCode::BAD_REQUEST,
            StoreError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            StoreError::StoreUnavailable(_) | StoreError::BucketPath(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            StoreError::Deserialization { .. }
            | StoreError::Config(_)
            | StoreError::Commit(_)
            | StoreError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache store.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_repository_maps_to_store_unavailable() {
        let err: StoreError = RepositoryError::Unavailable("lock poisoned".into()).into();
        assert!(matches!(err, StoreError::StoreUnavailable(_)));

        let err: StoreError = RepositoryError::ParentMissing("/x".into()).into();
        assert!(matches!(err, StoreError::Repository(_)));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (StoreError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (StoreError::InvalidRequest("k".into()), StatusCode::BAD_REQUEST),
            (
                StoreError::TooLarge { size: 2, max: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                StoreError::BucketPath("/var/httpcache".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                StoreError::Commit(RepositoryError::ParentMissing("/x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
