//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::queue::QueueError;
use crate::store::StoreError;
use crate::transactions::ManagerError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<ManagerError> for AppError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::Validation(e) => AppError::Domain(e),
            ManagerError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Malformed(e) => AppError::MalformedMessage(e.to_string()),
            QueueError::Invalid(e) => AppError::Domain(e),
            QueueError::Manager(e) => e.into(),
            QueueError::Transport(msg) => AppError::Unavailable(msg),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            AppError::Store(StoreError::InvalidPagingState(state)) => {
                (StatusCode::BAD_REQUEST, "invalid_paging_state", Some(state.clone()))
            }

            // 404 Not Found
            AppError::TransactionNotFound(tx) => {
                (StatusCode::NOT_FOUND, "transaction_not_found", Some(tx.clone()))
            }

            // 422 Unprocessable Entity
            AppError::MalformedMessage(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "malformed_message", Some(msg.clone()))
            }
            AppError::Domain(domain_err) => match domain_err {
                DomainError::MissingField(field) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "missing_field", Some(field.to_string()))
                }
                DomainError::InvalidAmount(e) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount", Some(e.to_string()))
                }
                DomainError::InvalidTimestamp(raw) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_timestamp", Some(raw.clone()))
                }
                DomainError::InvalidUserGuid(raw) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_user_guid", Some(raw.clone()))
                }
            },

            // 503 Service Unavailable
            AppError::Unavailable(msg) => {
                tracing::warn!("Store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
            }
            AppError::Store(e) if e.is_retryable() => {
                tracing::warn!("Store unavailable: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
            }

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
