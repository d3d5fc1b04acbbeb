//! Delivery providers.
//!
//! The [`Mailer`] trait is the only seam between the dispatch queue and the
//! outside mail service. The provider's own throughput ceiling is undocumented,
//! so the queue paces calls in front of it; implementations only need to send
//! one message and report whether the provider accepted it.

use std::{future::Future, pin::Pin, time::Duration};

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::message::Message;

pub const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Largest error body carried into a failure report.
const ERROR_PREVIEW_CHARS: usize = 512;

/// Core trait for outbound mail delivery.
pub trait Mailer: Send + Sync + 'static {
    /// Sends one message.
    ///
    /// # Returns
    /// `Ok(())` once the provider has accepted the message. Any error is a
    /// per-message failure; the caller never retries.
    fn send<'a>(
        &'a self,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = eyre::Result<()>> + Send + 'a>>;
}

/// Mailer that only records outbound messages in the log.
///
/// Used when no provider key is configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send<'a>(
        &'a self,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = eyre::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                recipient = %message.recipient,
                subject = %message.subject,
                "Mail provider not configured, logging message instead"
            );
            Ok(())
        })
    }
}

/// Mailer backed by the SendGrid v3 `mail/send` endpoint.
pub struct SendGridMailer {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl SendGridMailer {
    pub fn new(api_key: SecretString, timeout: Duration) -> eyre::Result<Self> {
        Self::with_endpoint(api_key, timeout, SENDGRID_URL)
    }

    pub fn with_endpoint(
        api_key: SecretString,
        timeout: Duration,
        endpoint: impl Into<String>,
    ) -> eyre::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

impl<'a> SendRequest<'a> {
    fn new(message: &'a Message, recipient: &'a str) -> Self {
        Self {
            personalizations: [Personalization {
                to: [Address { email: recipient }],
            }],
            from: Address {
                email: &message.sender,
            },
            subject: &message.subject,
            content: [Content {
                kind: "text/html",
                value: &message.body,
            }],
        }
    }
}

impl Mailer for SendGridMailer {
    fn send<'a>(
        &'a self,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = eyre::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let recipient = message.recipient.to_string();

            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(self.api_key.expose_secret())
                .json(&SendRequest::new(message, &recipient))
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_PREVIEW_CHARS).collect();

            Err(eyre::eyre!(
                "mail provider returned {}: {}",
                status.as_u16(),
                preview.trim()
            ))
        })
    }
}
