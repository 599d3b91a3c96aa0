//! Password-reset flow.
//!
//! Phase one ([`PasswordResetFlow::initiate_reset`]) stores a fresh ticket and
//! hands the mail carrying the raw token to a background task; phase two
//! ([`PasswordResetFlow::redeem_reset`]) trades the token for a new password
//! exactly once. Only the SHA-256 digest of a
//! token is ever persisted.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::AuthError;
use super::password::{PasswordHasher, validate_password_strength};
use crate::mailer::{Mailer, OutgoingMail};
use crate::models::auth::ResetTicket;
use crate::store::{CredentialStore, with_timeout};

/// Lifetime of a reset token.
pub const RESET_TOKEN_LIFETIME_MINUTES: i64 = 60;

const RESET_TOKEN_LEN: usize = 64;

/// Generate a raw reset token (64 alphanumeric characters).
pub fn generate_reset_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Hex-encoded SHA-256 digest of a raw reset token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Knobs for the reset flow.
#[derive(Debug, Clone)]
pub struct ResetSettings {
    /// Front-end base URL; the mailed link is `{base}/reset-password?token=…`.
    pub link_base: Url,
    pub token_lifetime: Duration,
    pub store_timeout: StdDuration,
    pub mail_timeout: StdDuration,
}

impl ResetSettings {
    pub fn new(link_base: Url, store_timeout: StdDuration, mail_timeout: StdDuration) -> Self {
        Self {
            link_base,
            token_lifetime: Duration::minutes(RESET_TOKEN_LIFETIME_MINUTES),
            store_timeout,
            mail_timeout,
        }
    }
}

/// How a queued reset mail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed(String),
    TimedOut,
}

/// Result of a successful initiation.
#[derive(Debug)]
pub enum ResetInitiated {
    /// No such user; nothing was stored or sent.
    NotAttempted,
    /// A ticket was stored and its mail is being delivered in the background.
    /// Dropping the handle detaches the task.
    Queued(JoinHandle<DeliveryStatus>),
}

impl ResetInitiated {
    pub fn is_queued(&self) -> bool {
        matches!(self, ResetInitiated::Queued(_))
    }
}

/// Collaborators for one reset operation. The mailer is owned so delivery can
/// outlive the request.
pub struct PasswordResetFlow<'a> {
    pub store: &'a dyn CredentialStore,
    pub mailer: Arc<dyn Mailer>,
    pub hasher: PasswordHasher,
    pub settings: &'a ResetSettings,
}

impl PasswordResetFlow<'_> {
    /// Start a reset for `username`.
    ///
    /// Returns as soon as the ticket is stored. Mail delivery runs on a spawned
    /// task bounded by `mail_timeout`, so known and unknown users answer
    /// equally fast. Only store failures surface as errors.
    pub async fn initiate_reset(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<ResetInitiated, AuthError> {
        let credential = with_timeout(
            self.settings.store_timeout,
            self.store.find_by_username(username),
        )
        .await?;
        let Some(credential) = credential else {
            debug!("password reset requested for unknown user");
            return Ok(ResetInitiated::NotAttempted);
        };

        let token = generate_reset_token();
        let ticket = ResetTicket {
            token_hash: hash_token(&token),
            expires_at: now + self.settings.token_lifetime,
        };
        with_timeout(
            self.settings.store_timeout,
            self.store.set_reset_token(&credential.username, &ticket),
        )
        .await?;

        let mail = reset_mail(&credential.email, &reset_link(&self.settings.link_base, &token));
        let handle = tokio::spawn(deliver(
            Arc::clone(&self.mailer),
            mail,
            credential.username,
            self.settings.mail_timeout,
        ));
        Ok(ResetInitiated::Queued(handle))
    }

    /// Redeem `token` and set `new_password`.
    ///
    /// Unknown, expired and already-used tokens all fail with
    /// [`AuthError::InvalidOrExpiredResetToken`].
    pub async fn redeem_reset(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        validate_password_strength(new_password)?;

        let token_hash = hash_token(token);
        let credential = with_timeout(
            self.settings.store_timeout,
            self.store.find_by_reset_token(&token_hash),
        )
        .await?
        .ok_or(AuthError::InvalidOrExpiredResetToken)?;

        match &credential.reset {
            Some(ticket) if !ticket.is_expired(now) => {}
            _ => {
                debug!(username = %credential.username, "reset token expired");
                return Err(AuthError::InvalidOrExpiredResetToken);
            }
        }

        let password_hash = self.hasher.hash(new_password)?;
        let completed = with_timeout(
            self.settings.store_timeout,
            self.store
                .complete_password_reset(&credential.username, &token_hash, &password_hash),
        )
        .await?;
        if !completed {
            debug!(username = %credential.username, "reset token redeemed concurrently");
            return Err(AuthError::InvalidOrExpiredResetToken);
        }

        info!(username = %credential.username, "password reset completed");
        Ok(())
    }
}

async fn deliver(
    mailer: Arc<dyn Mailer>,
    mail: OutgoingMail,
    username: String,
    timeout: StdDuration,
) -> DeliveryStatus {
    match tokio::time::timeout(timeout, mailer.send(&mail)).await {
        Ok(Ok(())) => {
            info!(username = %username, "password reset mail sent");
            DeliveryStatus::Sent
        }
        Ok(Err(e)) => {
            warn!(username = %username, error = %e, "password reset mail failed");
            DeliveryStatus::Failed(e.to_string())
        }
        Err(_) => {
            warn!(username = %username, timeout = ?timeout, "password reset mail timed out");
            DeliveryStatus::TimedOut
        }
    }
}

fn reset_link(base: &Url, token: &str) -> Url {
    let mut link = base.clone();
    if let Ok(mut segments) = link.path_segments_mut() {
        segments.pop_if_empty().push("reset-password");
    }
    link.query_pairs_mut().clear().append_pair("token", token);
    link
}

fn reset_mail(to: &str, link: &Url) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Reset your GoalPro password".to_string(),
        text: format!(
            "We received a request to reset your password.\n\n\
             Open this link to choose a new one:\n{link}\n\n\
             The link expires in {RESET_TOKEN_LIFETIME_MINUTES} minutes. \
             If you did not ask for this, you can ignore this email."
        ),
        html: Some(format!(
            "<p>We received a request to reset your password.</p>\
             <p><a href=\"{link}\">Choose a new password</a></p>\
             <p>The link expires in {RESET_TOKEN_LIFETIME_MINUTES} minutes.</p>"
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::auth::password::MIN_BCRYPT_COST;
    use crate::mailer::MailError;
    use crate::models::auth::Role;
    use crate::models::user::NewUser;
    use crate::store::{MemoryStore, UserDirectory};

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
    }

    impl RecordingMailer {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn last_token(&self) -> String {
            let sent = self.sent.lock().unwrap();
            let text = &sent.last().expect("no mail sent").text;
            let start = text.find("token=").expect("no token in mail") + "token=".len();
            text[start..start + RESET_TOKEN_LEN].to_string()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(mail.clone());
            if self.fail {
                return Err(MailError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(())
        }
    }

    struct StalledMailer;

    #[async_trait]
    impl Mailer for StalledMailer {
        async fn send(&self, _mail: &OutgoingMail) -> Result<(), MailError> {
            tokio::time::sleep(StdDuration::from_secs(30)).await;
            Ok(())
        }
    }

    fn settings() -> ResetSettings {
        ResetSettings::new(
            Url::parse("http://localhost:8080").unwrap(),
            StdDuration::from_secs(5),
            StdDuration::from_millis(300),
        )
    }

    async fn store_with_alice() -> MemoryStore {
        let store = MemoryStore::new();
        let hasher = PasswordHasher::new(MIN_BCRYPT_COST);
        store
            .create_user(&NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: hasher.hash("OldPassword1").unwrap(),
                first_name: "Alice".into(),
                last_name: "Doe".into(),
                birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                description: None,
                role: Role::Player,
            })
            .await
            .unwrap();
        store
    }

    fn flow<'a>(
        store: &'a MemoryStore,
        mailer: Arc<dyn Mailer>,
        settings: &'a ResetSettings,
    ) -> PasswordResetFlow<'a> {
        PasswordResetFlow {
            store,
            mailer,
            hasher: PasswordHasher::new(MIN_BCRYPT_COST),
            settings,
        }
    }

    /// Wait for the background delivery of a queued initiation.
    async fn delivered(initiated: ResetInitiated) -> DeliveryStatus {
        match initiated {
            ResetInitiated::Queued(handle) => handle.await.expect("delivery task panicked"),
            ResetInitiated::NotAttempted => panic!("nothing was queued"),
        }
    }

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), RESET_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn token_digest_is_hex_sha256() {
        let digest = hash_token("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn link_keeps_base_path() {
        let base = Url::parse("https://goalpro.test/app/").unwrap();
        let link = reset_link(&base, "tok123");
        assert_eq!(
            link.as_str(),
            "https://goalpro.test/app/reset-password?token=tok123"
        );
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::default());
        let settings = settings();
        let flow = flow(&store, mailer.clone(), &settings);
        let now = Utc::now();

        let initiated = flow.initiate_reset("alice", now).await.unwrap();
        assert_eq!(delivered(initiated).await, DeliveryStatus::Sent);
        let token = mailer.last_token();

        flow.redeem_reset(&token, "NewPassword1", now).await.unwrap();
        let err = flow
            .redeem_reset(&token, "NewPassword2", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredResetToken));

        let cred = store.find_by_username("alice").await.unwrap().unwrap();
        assert!(cred.reset.is_none());
        let hasher = PasswordHasher::new(MIN_BCRYPT_COST);
        assert!(hasher.verify("NewPassword1", &cred.password_hash).unwrap());
        assert!(!hasher.verify("NewPassword2", &cred.password_hash).unwrap());
    }

    #[tokio::test]
    async fn expired_token_fails_like_unknown_token() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::default());
        let settings = settings();
        let flow = flow(&store, mailer.clone(), &settings);
        let issued = Utc::now();

        delivered(flow.initiate_reset("alice", issued).await.unwrap()).await;
        let token = mailer.last_token();
        let later = issued + Duration::minutes(RESET_TOKEN_LIFETIME_MINUTES) + Duration::seconds(1);

        let expired = flow
            .redeem_reset(&token, "NewPassword1", later)
            .await
            .unwrap_err();
        let unknown = flow
            .redeem_reset(&generate_reset_token(), "NewPassword1", issued)
            .await
            .unwrap_err();
        assert!(matches!(expired, AuthError::InvalidOrExpiredResetToken));
        assert!(matches!(unknown, AuthError::InvalidOrExpiredResetToken));
        assert_eq!(expired.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn token_is_redeemable_until_expiry_instant() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::default());
        let settings = settings();
        let flow = flow(&store, mailer.clone(), &settings);
        let issued = Utc::now();

        delivered(flow.initiate_reset("alice", issued).await.unwrap()).await;
        let token = mailer.last_token();
        let at_expiry = issued + Duration::minutes(RESET_TOKEN_LIFETIME_MINUTES);
        flow.redeem_reset(&token, "NewPassword1", at_expiry)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn newer_initiation_supersedes_older_token() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::default());
        let settings = settings();
        let flow = flow(&store, mailer.clone(), &settings);
        let now = Utc::now();

        delivered(flow.initiate_reset("alice", now).await.unwrap()).await;
        let first = mailer.last_token();
        delivered(flow.initiate_reset("alice", now).await.unwrap()).await;
        let second = mailer.last_token();
        assert_ne!(first, second);

        let err = flow
            .redeem_reset(&first, "NewPassword1", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredResetToken));
        flow.redeem_reset(&second, "NewPassword1", now).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_user_is_not_an_error() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::default());
        let settings = settings();
        let flow = flow(&store, mailer.clone(), &settings);

        let result = flow.initiate_reset("nobody", Utc::now()).await.unwrap();
        assert!(!result.is_queued());
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mail_failure_keeps_ticket() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::failing());
        let settings = settings();
        let flow = flow(&store, mailer.clone(), &settings);
        let now = Utc::now();

        let result = flow.initiate_reset("alice", now).await.unwrap();
        assert!(matches!(delivered(result).await, DeliveryStatus::Failed(_)));
        let token = mailer.last_token();
        flow.redeem_reset(&token, "NewPassword1", now).await.unwrap();
    }

    #[tokio::test]
    async fn initiation_does_not_wait_for_a_stalled_mailer() {
        let store = store_with_alice().await;
        let settings = settings();
        let flow = flow(&store, Arc::new(StalledMailer), &settings);

        let started = Instant::now();
        let result = flow.initiate_reset("alice", Utc::now()).await.unwrap();
        assert!(started.elapsed() < settings.mail_timeout / 2);
        assert!(result.is_queued());

        let cred = store.find_by_username("alice").await.unwrap().unwrap();
        assert!(cred.reset.is_some());
        assert_eq!(delivered(result).await, DeliveryStatus::TimedOut);
    }

    #[tokio::test]
    async fn weak_password_leaves_token_usable() {
        let store = store_with_alice().await;
        let mailer = Arc::new(RecordingMailer::default());
        let settings = settings();
        let flow = flow(&store, mailer.clone(), &settings);
        let now = Utc::now();

        delivered(flow.initiate_reset("alice", now).await.unwrap()).await;
        let token = mailer.last_token();

        let err = flow.redeem_reset(&token, "short", now).await.unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)));
        flow.redeem_reset(&token, "NewPassword1", now).await.unwrap();
    }
}
