//! In-memory doubles for the store and mail provider seams.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use serde_email::Email;
use tokio::time::Instant;

use crate::{
    db::{respondent::Recipient, template::Template},
    error::Error,
    mailer::Mailer,
    message::{CorrelationKey, Message},
    store::{StoreFuture, SurveyStore},
};

pub fn message(recipient: &str, key: Option<&str>) -> Message {
    Message {
        recipient: Email::from_str(recipient).unwrap(),
        correlation: key.map(CorrelationKey::new),
        subject: "Invitation".to_owned(),
        body: "<p>hello</p>".to_owned(),
        sender: "surveys@example.com".to_owned(),
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    latency: Option<Duration>,
    sent: Mutex<Vec<(String, Instant)>>,
    bodies: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingMailer {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn fail_for<'a>(&self, recipients: impl IntoIterator<Item = &'a str>) {
        self.failing
            .lock()
            .extend(recipients.into_iter().map(str::to_owned));
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn sent_at(&self) -> Vec<Instant> {
        self.sent.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Mailer for RecordingMailer {
    fn send<'a>(
        &'a self,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = eyre::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let recipient = message.recipient.to_string();
            self.sent.lock().push((recipient.clone(), Instant::now()));
            self.bodies.lock().push(message.body.clone());

            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.lock().contains(&recipient) {
                return Err(eyre::eyre!("recipient {recipient} rejected"));
            }
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    respondents: Mutex<HashMap<String, Vec<Recipient>>>,
    templates: Mutex<HashMap<String, Vec<Template>>>,
    delivered: Mutex<Vec<Vec<CorrelationKey>>>,
    notified: Mutex<Vec<String>>,
    fail_mark_delivered: AtomicBool,
}

impl MemoryStore {
    pub fn add_respondent(&self, survey: &str, email: &str, key: &str, language: &str) {
        self.respondents
            .lock()
            .entry(survey.to_owned())
            .or_default()
            .push(Recipient {
                email: email.to_owned(),
                correlation_key: CorrelationKey::new(key),
                language: language.to_owned(),
            });
    }

    pub fn add_template(&self, survey: &str, language: &str, body: &str) {
        self.templates
            .lock()
            .entry(survey.to_owned())
            .or_default()
            .push(Template {
                language: language.to_owned(),
                body: body.to_owned(),
            });
    }

    pub fn fail_mark_delivered(&self, fail: bool) {
        self.fail_mark_delivered.store(fail, Ordering::SeqCst);
    }

    pub fn delivered_calls(&self) -> Vec<Vec<CorrelationKey>> {
        self.delivered.lock().clone()
    }

    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().clone()
    }
}

impl SurveyStore for MemoryStore {
    fn eligible_respondents<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, Vec<Recipient>> {
        Box::pin(async move {
            Ok(self
                .respondents
                .lock()
                .get(survey)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn templates<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, Vec<Template>> {
        Box::pin(async move {
            Ok(self
                .templates
                .lock()
                .get(survey)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn mark_delivered<'a>(&'a self, keys: &'a [CorrelationKey]) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            self.delivered.lock().push(keys.to_vec());
            if self.fail_mark_delivered.load(Ordering::SeqCst) {
                return Err(Error::internal(eyre::eyre!("store unavailable")));
            }
            Ok(keys.len() as u64)
        })
    }

    fn mark_notified<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.notified.lock().push(survey.to_owned());
            Ok(())
        })
    }
}
