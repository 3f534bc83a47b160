use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::store::StoreError;

pub type Result<T, E = ProgressionError> = std::result::Result<T, E>;

/// Errors surfaced by the progression engine.
#[derive(Debug, Error)]
pub enum ProgressionError {
    /// Malformed or missing input, rejected before any state mutation
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Uniqueness violation that survived the local retry
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// Text-generation collaborator unreachable or malformed. Recovered with
    /// fallback data before it reaches a handler.
    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("storage failure")]
    Storage(#[source] StoreError),
}

impl ProgressionError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ProgressionError::NotFound(what.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProgressionError::Validation(_) => StatusCode::BAD_REQUEST,
            ProgressionError::NotFound(_) => StatusCode::NOT_FOUND,
            ProgressionError::Conflict(_) => StatusCode::CONFLICT,
            ProgressionError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            ProgressionError::InvariantViolation(_) | ProgressionError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for ProgressionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => ProgressionError::Conflict(what),
            other => ProgressionError::Storage(other),
        }
    }
}

impl From<validator::ValidationErrors> for ProgressionError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ProgressionError::Validation(errors.to_string())
    }
}

impl IntoResponse for ProgressionError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server faults are logged in full but never echoed verbatim
        let message = match &self {
            ProgressionError::Storage(source) => {
                tracing::error!("Storage failure: {:#}", source);
                "Internal server error".to_string()
            }
            ProgressionError::InvariantViolation(detail) => {
                tracing::error!("Invariant violation: {}", detail);
                "Internal server error".to_string()
            }
            ProgressionError::ExternalService(detail) => {
                tracing::error!("External service error reached a handler: {}", detail);
                "Upstream service unavailable".to_string()
            }
            other => {
                tracing::warn!("Request rejected: {}", other);
                other.to_string()
            }
        };

        (
            status,
            Json(json!({
                "message": message,
                "status": status.as_u16()
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_details_are_not_exposed() {
        let err = ProgressionError::from(StoreError::Backend(anyhow::anyhow!(
            "connection reset by peer at 10.0.0.3"
        )));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(err, ProgressionError::Storage(_)));
    }

    #[test]
    fn store_conflict_maps_to_conflict() {
        let err = ProgressionError::from(StoreError::Conflict("progress".to_string()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
