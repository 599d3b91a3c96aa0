//! Password hashing via bcrypt.

use rand::Rng;
use rand::distr::Alphanumeric;

use super::AuthError;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// bcrypt's accepted cost range.
pub const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// bcrypt only reads the first 72 bytes of its input.
const BCRYPT_MAX_BYTES: usize = 72;

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt hasher with a fixed work factor.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher {
    /// Cost is clamped to bcrypt's accepted range (4..=31).
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password. Rejects input bcrypt would silently truncate.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        if password.contains('\0') {
            return Err(AuthError::Encoding("password contains a NUL byte".into()));
        }
        if password.len() > BCRYPT_MAX_BYTES {
            return Err(AuthError::Encoding(format!(
                "password exceeds {BCRYPT_MAX_BYTES} bytes"
            )));
        }
        bcrypt::hash(password, self.cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    /// Verify a password against a bcrypt hash. A wrong password is `Ok(false)`;
    /// only an unparseable stored hash is an error.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        bcrypt::verify(password, hash)
            .map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
    }
}

/// Checks login passwords against an optional stored hash.
///
/// When the user does not exist the password is still verified against a
/// throwaway hash of the same cost, so both failure paths take one bcrypt
/// verification.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    hasher: PasswordHasher,
    dummy_hash: String,
}

impl CredentialVerifier {
    /// Hashes a random secret once at `hasher`'s cost.
    pub fn new(hasher: PasswordHasher) -> Result<Self, AuthError> {
        let secret: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        Ok(Self {
            hasher,
            dummy_hash: hasher.hash(&secret)?,
        })
    }

    /// `Ok(true)` only for an existing hash that matches `password`.
    pub fn check(&self, password: &str, stored_hash: Option<&str>) -> Result<bool, AuthError> {
        match stored_hash {
            Some(hash) => self.hasher.verify(password, hash),
            None => {
                let _ = self.hasher.verify(password, &self.dummy_hash);
                Ok(false)
            }
        }
    }
}

/// Password policy: minimum length and at least one uppercase letter.
pub fn validate_password_strength(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(AuthError::ValidationError(
            "Password must contain at least one uppercase letter".into(),
        ));
    }
    Ok(())
}
