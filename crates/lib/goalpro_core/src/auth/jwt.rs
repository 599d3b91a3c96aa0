//! Session token codec: HS256 JWTs carrying username and role.
//!
//! The signing secret is injected at construction, so verification is a pure
//! function of `(token, secret, now)`.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use super::{AuthError, TokenError};
use crate::models::auth::{Role, Session, TokenClaims};

/// Issuer claim stamped on and required of every session token.
pub const ISSUER: &str = "goalpro";

/// Default session lifetime.
pub const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 8;

/// Secrets shorter than this are accepted but logged as weak.
const MIN_SECRET_LEN: usize = 32;

/// Lifetime and maximum age for session tokens.
///
/// `max_age` is enforced from `iat` independently of the token's own `exp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub lifetime: Duration,
    pub max_age: Duration,
}

impl SessionSettings {
    /// Settings where the maximum age equals the lifetime.
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            lifetime,
            max_age: lifetime,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::with_lifetime(Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS))
    }
}

/// A freshly signed token and its validity window.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies session tokens with a process-wide secret.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    settings: SessionSettings,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec. An empty secret is a configuration error.
    pub fn new(secret: &[u8], settings: SessionSettings) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Configuration("JWT secret is empty".into()));
        }
        if settings.lifetime <= Duration::zero() || settings.max_age <= Duration::zero() {
            return Err(AuthError::Configuration(
                "token lifetime and max age must be positive".into(),
            ));
        }
        if secret.len() < MIN_SECRET_LEN {
            warn!(len = secret.len(), "JWT secret is shorter than recommended");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Both age checks are done against an explicit `now` in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["sub", "iss", "exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            settings,
        })
    }

    /// Issue a token for `subject` with `role`, valid from now.
    pub fn issue(&self, subject: &str, role: Role) -> Result<IssuedToken, AuthError> {
        self.issue_at(subject, role, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let iat = now.timestamp();
        let exp = iat + self.settings.lifetime.num_seconds();
        let claims = TokenClaims {
            sub: subject.to_string(),
            role,
            iss: ISSUER.to_string(),
            iat,
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok(IssuedToken {
            token,
            issued_at: timestamp(iat)?,
            expires_at: timestamp(exp)?,
        })
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<Session, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify signature, issuer and both age conditions at `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Session, TokenError> {
        let claims = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| classify(token, e))?
            .claims;

        let now_ts = now.timestamp();
        if now_ts >= claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.iat > now_ts || now_ts - claims.iat > self.settings.max_age.num_seconds() {
            return Err(TokenError::Expired);
        }

        let issued_at = DateTime::from_timestamp(claims.iat, 0)
            .ok_or_else(|| TokenError::Malformed("iat out of range".into()))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| TokenError::Malformed("exp out of range".into()))?;

        Ok(Session {
            subject: claims.sub,
            role: claims.role,
            issued_at,
            expires_at,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Internal(format!("timestamp {secs} out of range")))
}

/// Map a decode failure onto the token error taxonomy.
fn classify(token: &str, err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::Signature,
        ErrorKind::InvalidIssuer => TokenError::Issuer,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        // Header and claims are intact, so the damage is in the signature segment.
        ErrorKind::Base64(_) if signed_parts_decode(token) => TokenError::Signature,
        _ => TokenError::Malformed(err.to_string()),
    }
}

fn signed_parts_decode(token: &str) -> bool {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(_), None) => {
            URL_SAFE_NO_PAD.decode(header).is_ok() && URL_SAFE_NO_PAD.decode(payload).is_ok()
        }
        _ => false,
    }
}

/// Resolve the JWT secret from the process environment.
///
/// See [`resolve_jwt_secret_with`].
pub fn resolve_jwt_secret(allow_generated: bool) -> Result<String, AuthError> {
    resolve_jwt_secret_with(|var| std::env::var(var).ok(), allow_generated)
}

/// Resolve the JWT secret: `JWT_SECRET` → `AUTH_SECRET` → persisted file.
///
/// The persisted-file fallback (generate on first use) only applies when
/// `allow_generated` is set; production callers pass `false` and treat the
/// error as fatal.
pub fn resolve_jwt_secret_with(
    lookup: impl Fn(&str) -> Option<String>,
    allow_generated: bool,
) -> Result<String, AuthError> {
    for var in ["JWT_SECRET", "AUTH_SECRET"] {
        if let Some(secret) = lookup(var)
            && !secret.trim().is_empty()
        {
            return Ok(secret);
        }
    }
    if !allow_generated {
        return Err(AuthError::Configuration(
            "JWT_SECRET (or AUTH_SECRET) must be set".into(),
        ));
    }
    Ok(load_or_generate_secret(&jwt_secret_path()))
}

/// Read a secret from `path`, or generate one and try to persist it there.
pub fn load_or_generate_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    let persisted = path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::write(path, &secret));
    match persisted {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "could not persist generated JWT secret; sessions will not survive a restart"
        ),
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("goalpro")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-with-plenty-of-bytes-0123456789";

    fn codec(settings: SessionSettings) -> TokenCodec {
        TokenCodec::new(SECRET, settings).unwrap()
    }

    fn one_hour() -> TokenCodec {
        codec(SessionSettings::with_lifetime(Duration::hours(1)))
    }

    #[test]
    fn round_trip_preserves_subject_and_role() {
        let codec = one_hour();
        for role in Role::ALL {
            let issued = codec.issue("alice", role).unwrap();
            let session = codec.verify(&issued.token).unwrap();
            assert_eq!(session.subject, "alice");
            assert_eq!(session.role, role);
            assert_eq!(session.expires_at - session.issued_at, Duration::hours(1));
            assert_eq!(session.expires_at, issued.expires_at);
        }
    }

    #[test]
    fn token_older_than_max_age_is_rejected_even_before_exp() {
        let codec = codec(SessionSettings {
            lifetime: Duration::hours(2),
            max_age: Duration::hours(1),
        });
        let now = Utc::now();
        let issued = codec
            .issue_at("alice", Role::User, now - Duration::minutes(61))
            .unwrap();
        assert!(issued.expires_at > now);
        assert_eq!(codec.verify_at(&issued.token, now), Err(TokenError::Expired));
    }

    #[test]
    fn token_past_exp_is_rejected() {
        let codec = one_hour();
        let now = Utc::now();
        let issued = codec
            .issue_at("alice", Role::User, now - Duration::minutes(61))
            .unwrap();
        assert_eq!(codec.verify_at(&issued.token, now), Err(TokenError::Expired));
        assert_eq!(
            codec.verify_at(&issued.token, issued.expires_at),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn token_from_the_future_is_rejected() {
        let codec = one_hour();
        let now = Utc::now();
        let issued = codec
            .issue_at("alice", Role::User, now + Duration::minutes(5))
            .unwrap();
        assert_eq!(codec.verify_at(&issued.token, now), Err(TokenError::Expired));
    }

    #[test]
    fn every_signature_position_is_tamper_evident() {
        let codec = one_hour();
        let token = codec.issue("alice", Role::Admin).unwrap().token;
        let sig_start = token.rfind('.').unwrap() + 1;

        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                codec.verify(&tampered),
                Err(TokenError::Signature),
                "position {i}"
            );
        }
    }

    #[test]
    fn forged_claims_fail_signature_check() {
        let codec = one_hour();
        let token = codec.issue("alice", Role::User).unwrap().token;
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = TokenClaims {
            sub: "alice".into(),
            role: Role::Admin,
            iss: ISSUER.into(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 3600,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], payload, parts[2]);
        assert_eq!(codec.verify(&forged), Err(TokenError::Signature));
    }

    #[test]
    fn different_secret_is_a_signature_error() {
        let ours = one_hour();
        let theirs = TokenCodec::new(
            b"another-secret-that-is-also-long-enough!!",
            SessionSettings::with_lifetime(Duration::hours(1)),
        )
        .unwrap();
        let token = theirs.issue("mallory", Role::Admin).unwrap().token;
        assert_eq!(ours.verify(&token), Err(TokenError::Signature));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let codec = one_hour();
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "alice".into(),
            role: Role::User,
            iss: "courses_app".into(),
            iat: now,
            exp: now + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert_eq!(codec.verify(&token), Err(TokenError::Issuer));
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = one_hour();
        for garbage in ["", "abc", "a.b", "not.a.jwt", "a.b.c.d"] {
            assert!(
                matches!(codec.verify(garbage), Err(TokenError::Malformed(_))),
                "{garbage:?}"
            );
        }
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        let err = TokenCodec::new(b"", SessionSettings::default()).unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn generated_secret_is_persisted_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jwt-secret");
        let first = load_or_generate_secret(&path);
        assert_eq!(first.len(), 64);
        assert_eq!(load_or_generate_secret(&path), first);
    }

    #[test]
    fn secret_resolution_prefers_jwt_secret_then_auth_secret() {
        let both = |var: &str| match var {
            "JWT_SECRET" => Some("primary".to_string()),
            "AUTH_SECRET" => Some("fallback".to_string()),
            _ => None,
        };
        assert_eq!(resolve_jwt_secret_with(both, false).unwrap(), "primary");

        let blank_primary = |var: &str| match var {
            "JWT_SECRET" => Some("   ".to_string()),
            "AUTH_SECRET" => Some("fallback".to_string()),
            _ => None,
        };
        assert_eq!(
            resolve_jwt_secret_with(blank_primary, false).unwrap(),
            "fallback"
        );
    }

    #[test]
    fn missing_secret_is_fatal_when_generation_is_not_allowed() {
        let err = resolve_jwt_secret_with(|_| None, false).unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }
}
