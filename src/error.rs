//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Currency mismatch on account {account_id}: account holds {account_currency}, request was {requested}")]
    CurrencyMismatch {
        account_id: i64,
        account_currency: String,
        requested: String,
    },

    // Store errors carry their own classification
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
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
            AppError::UnsupportedCurrency(code) => (
                StatusCode::BAD_REQUEST,
                "unsupported_currency",
                Some(code.clone()),
            ),
            AppError::CurrencyMismatch { .. } => (
                StatusCode::BAD_REQUEST,
                "currency_mismatch",
                Some(self.to_string()),
            ),

            // Store errors - map to appropriate HTTP status
            AppError::Store(ref store_err) => match store_err {
                StoreError::AccountNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "account_not_found",
                    Some(id.to_string()),
                ),
                StoreError::EntryNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "entry_not_found",
                    Some(id.to_string()),
                ),
                StoreError::TransferNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "transfer_not_found",
                    Some(id.to_string()),
                ),
                StoreError::SessionNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "session_not_found",
                    Some(id.to_string()),
                ),
                StoreError::InvalidAmount(amount) => (
                    StatusCode::BAD_REQUEST,
                    "invalid_amount",
                    Some(amount.to_string()),
                ),
                StoreError::InsufficientBalance { .. } => (
                    StatusCode::BAD_REQUEST,
                    "insufficient_balance",
                    Some(store_err.to_string()),
                ),
                // Safe to retry: nothing persisted from the rolled-back unit
                StoreError::Conflict => (StatusCode::CONFLICT, "conflict", None),
                StoreError::Unavailable(e) => {
                    tracing::error!("store unavailable: {:?}", e);
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
                }
            },

            // 500 Internal Server Error
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_classification() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (
                AppError::UnsupportedCurrency("XYZ".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Store(StoreError::AccountNotFound(4)),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Store(StoreError::InvalidAmount(-1)),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::Store(StoreError::Conflict), StatusCode::CONFLICT),
            (
                AppError::Store(StoreError::Unavailable(sqlx::Error::PoolTimedOut)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
