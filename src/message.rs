//! Outbound invitation messages and their delivery outcomes.
//!
//! A [`Message`] is built once by the lifecycle controller, moved into the
//! dispatch queue, and consumed by value by exactly one send attempt. Its
//! terminal [`DeliveryOutcome`] is reported to the reconciler and then dropped.
//!
//! # Message Lifecycle
//!
//! 1. Messages are rendered and enqueued (pending)
//! 2. The drain loop pulls them into a batch and hands each to the mailer
//! 3. The outcome is either `Delivered` or `Failed`; failed messages are
//!    logged and never retried

use serde::{Deserialize, Serialize};
use serde_email::Email;

/// Opaque per-respondent identifier.
///
/// Links a sent message back to its respondent row during reconciliation and
/// forms the last segment of the respondent's survey deep link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generates a fresh random key for a new respondent.
    pub fn generate() -> eyre::Result<Self> {
        crate::utils::generate_token::<12>(rand::thread_rng()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A fully rendered invitation, ready to hand to the mail provider.
#[derive(Debug, Clone)]
pub struct Message {
    /// Recipient mailbox
    pub recipient: Email,
    /// `None` for test messages, which are delivered but never reconciled
    pub correlation: Option<CorrelationKey>,
    pub subject: String,
    /// Rendered HTML body
    pub body: String,
    /// Deployment-wide sender identity
    pub sender: String,
}

/// Terminal result of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The provider accepted the message
    Delivered,
    /// The provider rejected the message or could not be reached
    Failed,
}

/// Outcome of one send paired with the message's correlation key.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub correlation: Option<CorrelationKey>,
    pub outcome: DeliveryOutcome,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        self.outcome == DeliveryOutcome::Delivered
    }
}

/// Keys of every delivered, reconcilable message in `deliveries`, in order.
pub fn delivered_keys(deliveries: impl IntoIterator<Item = Delivery>) -> Vec<CorrelationKey> {
    deliveries
        .into_iter()
        .filter(Delivery::is_delivered)
        .filter_map(|d| d.correlation)
        .collect()
}
