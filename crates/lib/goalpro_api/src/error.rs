//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use goalpro_core::auth::{AuthError, TokenError};
use goalpro_core::store::StoreError;
use thiserror::Error;
use tracing::{debug, error};

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Message for every failed reset redemption, whatever the cause.
pub const INVALID_RESET_TOKEN_MESSAGE: &str = "Password reset token is invalid or has expired";

/// Message for every failed login, whatever the cause.
pub const BAD_CREDENTIALS_MESSAGE: &str = "Incorrect username or password";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::InvalidResetToken => (
                StatusCode::BAD_REQUEST,
                "invalid_reset_token",
                INVALID_RESET_TOKEN_MESSAGE,
            ),
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        debug!(kind = e.kind(), "session token rejected");
        AppError::Unauthorized("Unauthorized".into())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => AppError::Validation(format!("{what} already exists")),
            StoreError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CredentialError => AppError::Unauthorized(BAD_CREDENTIALS_MESSAGE.into()),
            AuthError::Token(t) => AppError::from(t),
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::InvalidOrExpiredResetToken => AppError::InvalidResetToken,
            AuthError::ValidationError(msg) | AuthError::Encoding(msg) => {
                AppError::Validation(msg)
            }
            // Collaborator failures never surface as a more specific auth error.
            AuthError::Store(e) => AppError::Internal(e.to_string()),
            AuthError::Configuration(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
