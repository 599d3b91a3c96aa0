//! Outbound mail collaborator.
//!
//! The password-reset flow hands each message to a [`Mailer`]. How it gets
//! delivered is the implementation's business: [`HttpMailer`] posts to a
//! Resend-compatible HTTP API, [`LogMailer`] only logs (local development).

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// A plain-text message with an optional HTML alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// Mail delivery errors.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail API rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Mail delivery abstraction.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error describing why it was not sent.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Local dev sender that logs instead of sending real email.
///
/// The body (which may contain a reset link) is only emitted at `debug`.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "mail send stub");
        debug!(body = %mail.text, "mail send stub body");
        Ok(())
    }
}

/// Request body of a Resend-compatible `POST /emails` API.
#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
}

/// Sends mail through an HTTP mail API with bearer-token auth.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(
        endpoint: Url,
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let body = SendEmailRequest {
            from: &self.from,
            to: [&mail.to],
            subject: &mail.subject,
            text: &mail.text,
            html: mail.html.as_deref(),
        };
        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(to = %mail.to, status = status.as_u16(), "mail accepted by API");
        Ok(())
    }
}
