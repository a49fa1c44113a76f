use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional details (validation messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Unified error type for all domain services.
///
/// The taxonomy separates caller-fixable failures (validation, insufficient
/// stock, illegal state transitions) from faults the operator must escalate
/// (invariant breaches, database errors). Handlers rely on `status_code` /
/// `response_message` for a consistent HTTP mapping.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Audit invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Event error: {0}")]
    Event(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Helper that keeps call sites terse when mapping DbErr.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::Database(err)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::InvalidState(_) => StatusCode::CONFLICT,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Database(_)
            | ServiceError::InvariantViolation(_)
            | ServiceError::Event(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller. Infrastructure failures are
    /// reported generically so internals never leak through the API.
    pub fn response_message(&self) -> String {
        match self {
            ServiceError::Database(_) => "A database error occurred".to_string(),
            ServiceError::Internal(_) => "An internal error occurred".to_string(),
            ServiceError::InvariantViolation(_) => {
                "The operation was aborted to protect data consistency".to_string()
            }
            other => other.to_string(),
        }
    }

    /// True when the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
