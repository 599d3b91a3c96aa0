//! Authentication and authorization logic.
//!
//! Password hashing, session token issue/verify, sliding rotation, the
//! password-reset flow and the role gate. Shared by `goalpro_api` and the
//! server binary.

pub mod gate;
pub mod jwt;
pub mod password;
pub mod reset;
pub mod rotation;

use thiserror::Error;

use crate::store::StoreError;

/// Why a session token was rejected. Every kind maps to the same outward
/// "unauthorized" response; the distinction is for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    Signature,

    #[error("token expired")]
    Expired,

    #[error("unexpected issuer")]
    Issuer,
}

impl TokenError {
    /// Short label for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Malformed(_) => "malformed",
            TokenError::Signature => "signature",
            TokenError::Expired => "expired",
            TokenError::Issuer => "issuer",
        }
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid or expired reset token")]
    InvalidOrExpiredResetToken,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Password encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
