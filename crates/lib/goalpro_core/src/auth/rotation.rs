//! Sliding session rotation.
//!
//! Rotation is driven purely by the token's remaining lifetime, so it needs no
//! server-side state. Concurrent requests inside the rotation window may each
//! mint a token; all of them stay valid until their own expiry.

use chrono::{DateTime, Duration, Utc};

use super::AuthError;
use super::jwt::{IssuedToken, TokenCodec};
use crate::models::auth::Session;

/// Remaining lifetime below which a valid token is reissued.
pub const ROTATION_THRESHOLD_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    Keep,
    Rotate,
}

#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    threshold: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(ROTATION_THRESHOLD_MINUTES))
    }
}

impl RotationPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// Rotate only when `0 < time_left < threshold`.
    pub fn decide(&self, session: &Session, now: DateTime<Utc>) -> RotationDecision {
        let time_left = session.expires_at - now;
        if time_left > Duration::zero() && time_left < self.threshold {
            RotationDecision::Rotate
        } else {
            RotationDecision::Keep
        }
    }

    /// Mint a replacement token if the session is inside the rotation window.
    pub fn maybe_rotate(
        &self,
        codec: &TokenCodec,
        session: &Session,
    ) -> Result<Option<IssuedToken>, AuthError> {
        self.maybe_rotate_at(codec, session, Utc::now())
    }

    pub fn maybe_rotate_at(
        &self,
        codec: &TokenCodec,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<Option<IssuedToken>, AuthError> {
        match self.decide(session, now) {
            RotationDecision::Keep => Ok(None),
            RotationDecision::Rotate => codec
                .issue_at(&session.subject, session.role, now)
                .map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::SessionSettings;
    use crate::models::auth::Role;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            b"rotation-test-secret-0123456789abcdef",
            SessionSettings::with_lifetime(Duration::hours(1)),
        )
        .unwrap()
    }

    fn session_with(time_left: Duration, now: DateTime<Utc>) -> Session {
        Session {
            subject: "alice".into(),
            role: Role::Player,
            issued_at: now + time_left - Duration::hours(1),
            expires_at: now + time_left,
        }
    }

    #[test]
    fn rotates_just_inside_threshold() {
        let now = Utc::now();
        let policy = RotationPolicy::default();
        let session = session_with(Duration::minutes(14) + Duration::seconds(59), now);
        assert_eq!(policy.decide(&session, now), RotationDecision::Rotate);
    }

    #[test]
    fn keeps_just_outside_threshold() {
        let now = Utc::now();
        let policy = RotationPolicy::default();
        let session = session_with(Duration::minutes(15) + Duration::seconds(1), now);
        assert_eq!(policy.decide(&session, now), RotationDecision::Keep);
        let session = session_with(Duration::minutes(15), now);
        assert_eq!(policy.decide(&session, now), RotationDecision::Keep);
    }

    #[test]
    fn expired_sessions_are_left_alone() {
        let now = Utc::now();
        let policy = RotationPolicy::default();
        assert_eq!(
            policy.decide(&session_with(Duration::zero(), now), now),
            RotationDecision::Keep
        );
        assert_eq!(
            policy.decide(&session_with(Duration::minutes(-3), now), now),
            RotationDecision::Keep
        );
    }

    #[test]
    fn rotated_token_carries_full_lifetime_and_is_not_rotated_again() {
        let codec = codec();
        let policy = RotationPolicy::default();
        let now = Utc::now();
        let old = codec
            .issue_at("alice", Role::Coach, now - Duration::minutes(50))
            .unwrap();
        let session = codec.verify_at(&old.token, now).unwrap();

        let fresh = policy
            .maybe_rotate_at(&codec, &session, now)
            .unwrap()
            .expect("near-expiry session rotates");
        let fresh_session = codec.verify_at(&fresh.token, now).unwrap();
        assert_eq!(fresh_session.subject, "alice");
        assert_eq!(fresh_session.role, Role::Coach);
        assert_eq!(
            fresh_session.expires_at - fresh_session.issued_at,
            Duration::hours(1)
        );

        assert!(
            policy
                .maybe_rotate_at(&codec, &fresh_session, now)
                .unwrap()
                .is_none()
        );
        // The superseded token stays valid until its own expiry.
        assert!(codec.verify_at(&old.token, now).is_ok());
    }
}
