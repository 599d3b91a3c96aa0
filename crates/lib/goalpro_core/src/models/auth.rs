//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! types (which carry `#[serde(rename_all = "camelCase")]` etc.).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User role. Closed set; the default is the least privileged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Player,
    Coach,
    Admin,
}

/// Returned when a role string is not one of the known roles.
#[derive(Debug, Clone, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    /// Every role, least privileged first.
    pub const ALL: [Role; 4] = [Role::User, Role::Player, Role::Coach, Role::Admin];

    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Player => "PLAYER",
            Role::Coach => "COACH",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Pending password-reset ticket. Token digest and expiry only exist together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTicket {
    /// SHA-256 hex digest of the emailed token.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetTicket {
    /// A ticket is redeemable up to and including its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Credential record: everything the auth core needs to know about a user.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub reset: Option<ResetTicket>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("reset_pending", &self.reset.is_some())
            .finish()
    }
}

/// JWT claims embedded in session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject — username (standard JWT `sub` claim).
    pub sub: String,
    /// Role copied from the credential record at issuance.
    pub role: Role,
    /// Issuer.
    pub iss: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// A verified session, reconstructed from a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
