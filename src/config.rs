use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::Error;

/// Largest batch whose delivery acknowledgment fits in one SQLite statement:
/// one bound key per message plus the `sent_at` timestamp, under SQLite's
/// limit of 32766 bound parameters.
pub const MAX_BATCH_SIZE: usize = 32765;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub db_path: Option<String>,
    pub bind: Option<String>,

    /// Base URL of the respondent-facing survey form. Deep links are built
    /// as `{survey_url}/{survey}/{correlation_key}`.
    pub survey_url: Option<String>,

    pub mail_from: Option<String>,
    pub mail_subject: Option<String>,
    pub default_language: Option<String>,

    /// Messages per window.
    pub batch_size: Option<usize>,
    pub window_ms: Option<u64>,

    /// When unset, outbound mail is only logged.
    pub sendgrid_api_key: Option<SecretString>,
    pub sendgrid_url: Option<String>,
    pub mail_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        let config = envy::prefixed("ONA_").from_env::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self.batch_size {
            Some(0) => Err(Error::invalid_parameter("ONA_BATCH_SIZE must be at least 1")),
            Some(size) if size > MAX_BATCH_SIZE => Err(Error::invalid_parameter(format!(
                "ONA_BATCH_SIZE must be at most {MAX_BATCH_SIZE}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn db_path(&self) -> &str {
        self.db_path.as_deref().unwrap_or("ona.db")
    }

    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or("127.0.0.1:8080")
    }

    pub fn survey_url(&self) -> &str {
        self.survey_url
            .as_deref()
            .unwrap_or("http://localhost:3000/survey")
    }

    pub fn mail_from(&self) -> &str {
        self.mail_from.as_deref().unwrap_or("surveys@localhost")
    }

    pub fn mail_subject(&self) -> &str {
        self.mail_subject
            .as_deref()
            .unwrap_or("You have been invited to a survey")
    }

    pub fn default_language(&self) -> &str {
        self.default_language.as_deref().unwrap_or("en")
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(10)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms.unwrap_or(1000))
    }

    pub fn mail_timeout(&self) -> Duration {
        Duration::from_secs(self.mail_timeout_secs.unwrap_or(30))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            bind: None,
            survey_url: None,
            mail_from: None,
            mail_subject: None,
            default_language: None,
            batch_size: None,
            window_ms: None,
            sendgrid_api_key: None,
            sendgrid_url: None,
            mail_timeout_secs: None,
        }
    }
}
