//! Survey lifecycle entry points: starting a survey and sending a test
//! invitation.
//!
//! Both entry points spawn a detached task and return its handle at once;
//! callers are free to drop it. Whatever goes wrong inside the task is logged
//! at its boundary. Lookup misses (unknown survey, no eligible respondents, no
//! template for the language or the default language) are not errors: they
//! simply lead to fewer, possibly zero, enqueued messages.

use std::sync::Arc;

use serde_email::Email;
use tokio::task::JoinHandle;

use crate::{
    db::respondent::Recipient,
    error::Error,
    message::{CorrelationKey, Message},
    queue::DispatchQueue,
    store::SurveyStore,
    template::{Renderer, Templates},
};

/// Deep-link key used for test invitations.
pub const PREVIEW_KEY: &str = "preview";

#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn SurveyStore>,
    queue: DispatchQueue,
    renderer: Renderer,
    sender: String,
    subject: String,
    default_language: String,
}

#[bon::bon]
impl Lifecycle {
    #[builder]
    pub fn new(
        store: Arc<dyn SurveyStore>,
        queue: DispatchQueue,
        renderer: Renderer,
        #[builder(into)] sender: String,
        #[builder(into)] subject: String,
        #[builder(into, default = String::from("en"))] default_language: String,
    ) -> Self {
        Self {
            store,
            queue,
            renderer,
            sender,
            subject,
            default_language,
        }
    }
}

impl Lifecycle {
    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// Invites every eligible respondent of `survey` in the background.
    ///
    /// The handle resolves to the number of messages enqueued.
    pub fn start_survey(&self, survey: impl Into<String>) -> JoinHandle<usize> {
        let this = self.clone();
        let survey = survey.into();

        self.queue.runtime().spawn(async move {
            match this.issue_invitations(&survey).await {
                Ok(enqueued) => {
                    tracing::info!(survey, enqueued, "Survey invitations queued");
                    enqueued
                }
                Err(e) => {
                    tracing::error!(survey, error = ?e, "Failed to start survey");
                    0
                }
            }
        })
    }

    /// Sends one test invitation for `survey` to `recipient`, ignoring
    /// respondent eligibility.
    pub fn send_test_message(
        &self,
        recipient: Email,
        survey: impl Into<String>,
        language: impl Into<String>,
    ) -> JoinHandle<usize> {
        let this = self.clone();
        let survey = survey.into();
        let language = language.into();

        self.queue.runtime().spawn(async move {
            match this.issue_test_message(recipient, &survey, &language).await {
                Ok(enqueued) => {
                    tracing::info!(survey, language, enqueued, "Test invitation queued");
                    enqueued
                }
                Err(e) => {
                    tracing::error!(
                        survey,
                        language,
                        error = ?e,
                        "Failed to send test invitation"
                    );
                    0
                }
            }
        })
    }

    /// Renders and enqueues one invitation per eligible respondent.
    ///
    /// A respondent that cannot be rendered is logged and skipped; the rest
    /// are still enqueued. Once anything has been enqueued the survey is
    /// marked as notified.
    pub async fn issue_invitations(&self, survey: &str) -> Result<usize, Error> {
        let recipients = self.store.eligible_respondents(survey).await?;
        if recipients.is_empty() {
            tracing::info!(survey, "No eligible respondents, nothing to send");
            return Ok(0);
        }

        let templates = self.templates(survey).await?;
        if templates.is_empty() {
            tracing::warn!(survey, "Survey has no invitation templates, nothing to send");
            return Ok(0);
        }

        let mut enqueued = 0;
        for recipient in recipients {
            match self.invitation(survey, &templates, recipient) {
                Ok(message) => {
                    self.queue.enqueue(message);
                    enqueued += 1;
                }
                Err(e) => {
                    tracing::warn!(survey, error = ?e, "Skipping respondent");
                }
            }
        }

        if enqueued > 0 {
            if let Err(e) = self.store.mark_notified(survey).await {
                tracing::error!(survey, error = ?e, "Failed to record survey notification");
            }
        }

        Ok(enqueued)
    }

    /// Renders and enqueues a single, never reconciled, test invitation.
    pub async fn issue_test_message(
        &self,
        recipient: Email,
        survey: &str,
        language: &str,
    ) -> Result<usize, Error> {
        let templates = self.templates(survey).await?;

        let Some(text) = templates.lookup(language, &self.default_language) else {
            tracing::warn!(
                survey,
                language,
                "No template for language or default language, test invitation not sent"
            );
            return Ok(0);
        };

        let body = self
            .renderer
            .render(text, survey, &CorrelationKey::new(PREVIEW_KEY));

        self.queue.enqueue(Message {
            recipient,
            correlation: None,
            subject: self.subject.clone(),
            body,
            sender: self.sender.clone(),
        });

        Ok(1)
    }

    async fn templates(&self, survey: &str) -> Result<Templates, Error> {
        Ok(self
            .store
            .templates(survey)
            .await?
            .into_iter()
            .map(|t| (t.language, t.body))
            .collect())
    }

    fn invitation(
        &self,
        survey: &str,
        templates: &Templates,
        recipient: Recipient,
    ) -> Result<Message, Error> {
        let text = templates
            .lookup(&recipient.language, &self.default_language)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "template for language {} (or default {}) in survey {survey}",
                    recipient.language, self.default_language
                ))
            })?;

        let email = Email::from_str(&recipient.email).map_err(|e| {
            Error::invalid_parameter(format!(
                "invalid recipient address {}: {e}",
                recipient.email
            ))
        })?;

        let body = self
            .renderer
            .render(text, survey, &recipient.correlation_key);

        Ok(Message {
            recipient: email,
            correlation: Some(recipient.correlation_key),
            subject: self.subject.clone(),
            body,
            sender: self.sender.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use tokio::time::Instant;

    use super::*;
    use crate::{
        reconcile::Reconciler,
        testing::{MemoryStore, RecordingMailer},
    };

    fn lifecycle(
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        window: Duration,
    ) -> Lifecycle {
        let queue = DispatchQueue::builder()
            .mailer(mailer)
            .reconciler(Reconciler::new(store.clone()))
            .batch_size(10)
            .window(window)
            .build();

        Lifecycle::builder()
            .store(store)
            .queue(queue)
            .renderer(Renderer::parse("https://ona.example.com/s").unwrap())
            .sender("surveys@example.com")
            .subject("Invitation")
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_survey_end_to_end() {
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        for i in 0..12 {
            store.add_respondent("pilot", &format!("r{i}@example.com"), &format!("k{i}"), "en");
        }
        store.add_template("pilot", "en", "Please answer: {{link}}");

        let window = Duration::from_millis(1000);
        let lifecycle = lifecycle(store.clone(), mailer.clone(), window);

        let started = Instant::now();
        let enqueued = lifecycle.start_survey("pilot").await.unwrap();
        assert_eq!(enqueued, 12);

        lifecycle.queue().idle().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= window);
        assert!(elapsed < window * 2);

        let calls = store.delivered_calls();
        let sizes: Vec<usize> = calls.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 2]);

        let keys: HashSet<CorrelationKey> = calls.into_iter().flatten().collect();
        let expected: HashSet<CorrelationKey> =
            (0..12).map(|i| CorrelationKey::new(format!("k{i}"))).collect();
        assert_eq!(keys, expected);

        assert_eq!(store.notified(), vec!["pilot"]);
        assert!(mailer.bodies()[0].contains("https://ona.example.com/s/pilot/k0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_message_bypasses_eligibility() {
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        store.add_template("pilot", "en", "Preview");

        let lifecycle = lifecycle(store.clone(), mailer.clone(), Duration::from_secs(1));

        let enqueued = lifecycle
            .send_test_message(Email::from_str("x@example.com").unwrap(), "pilot", "en")
            .await
            .unwrap();
        assert_eq!(enqueued, 1);

        lifecycle.queue().idle().await;

        assert_eq!(mailer.recipients(), vec!["x@example.com"]);
        assert!(mailer.bodies()[0].contains("/pilot/preview"));
        assert!(store.delivered_calls().is_empty());
        assert!(store.notified().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_language_falls_back_to_default() {
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        store.add_respondent("pilot", "fr@example.com", "fr", "'fr'");
        store.add_respondent("pilot", "de@example.com", "de", "de");
        store.add_template("pilot", "\"en\"", "english");
        store.add_template("pilot", "FR", "french");

        let lifecycle = lifecycle(store.clone(), mailer.clone(), Duration::from_secs(1));

        assert_eq!(lifecycle.issue_invitations("pilot").await.unwrap(), 2);
        lifecycle.queue().idle().await;

        let bodies = mailer.bodies();
        assert!(bodies[0].contains("french"));
        assert!(bodies[1].contains("english"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_respondents_skipped() {
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        store.add_respondent("pilot", "es@example.com", "es", "es");
        store.add_respondent("pilot", "not-an-address", "bad", "fr");
        store.add_respondent("pilot", "ok@example.com", "ok", "fr");
        store.add_template("pilot", "fr", "french");

        let lifecycle = Lifecycle::builder()
            .store(store.clone())
            .queue(
                DispatchQueue::builder()
                    .mailer(mailer.clone())
                    .reconciler(Reconciler::new(store.clone()))
                    .build(),
            )
            .renderer(Renderer::parse("https://ona.example.com/s").unwrap())
            .sender("surveys@example.com")
            .subject("Invitation")
            .default_language("de")
            .build();

        assert_eq!(lifecycle.issue_invitations("pilot").await.unwrap(), 1);
        lifecycle.queue().idle().await;

        assert_eq!(mailer.recipients(), vec!["ok@example.com"]);
        assert_eq!(store.delivered_calls(), vec![vec![CorrelationKey::new("ok")]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_effect_success() {
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        store.add_respondent("no-templates", "a@example.com", "a", "en");
        store.add_template("no-respondents", "en", "hello");

        let lifecycle = lifecycle(store.clone(), mailer.clone(), Duration::from_secs(1));

        assert_eq!(lifecycle.start_survey("unknown").await.unwrap(), 0);
        assert_eq!(lifecycle.start_survey("no-templates").await.unwrap(), 0);
        assert_eq!(lifecycle.start_survey("no-respondents").await.unwrap(), 0);

        let recipient = Email::from_str("x@example.com").unwrap();
        assert_eq!(
            lifecycle
                .send_test_message(recipient, "no-templates", "en")
                .await
                .unwrap(),
            0
        );

        assert!(!lifecycle.queue().is_draining());
        assert!(mailer.recipients().is_empty());
        assert!(store.notified().is_empty());
    }
}
