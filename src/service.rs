use std::sync::Arc;

use serde_email::Email;
use sqlx::{
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode,
        SqlitePoolOptions,
    },
    Acquire, SqlitePool,
};
use tokio::task::JoinHandle;

use crate::{
    config::Config,
    db::{
        respondent::{NewRespondent, Respondent},
        survey::{Survey, SurveyStatistics},
        template::Template,
    },
    error::Error,
    lifecycle::Lifecycle,
    mailer::{LogMailer, Mailer, SendGridMailer},
    message::CorrelationKey,
    queue::DispatchQueue,
    reconcile::Reconciler,
    store::SqliteStore,
    template::Renderer,
};

pub struct Service {
    db: SqlitePool,
    config: Config,
    lifecycle: Lifecycle,
}

#[bon::bon]
impl Service {
    /// Opens the database, runs migrations and wires up the dispatch core.
    ///
    /// Without an explicit `mailer`, a SendGrid mailer is used when an API key
    /// is configured and a [`LogMailer`] otherwise.
    #[builder]
    pub async fn connect_with(
        #[builder(default)] config: Config,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let opts = SqliteConnectOptions::new()
            .filename(config.db_path())
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .locking_mode(SqliteLockingMode::Normal)
            .optimize_on_close(true, None)
            .auto_vacuum(SqliteAutoVacuum::Full);

        let pool = SqlitePoolOptions::new().connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let mailer = match mailer {
            Some(mailer) => mailer,
            None => default_mailer(&config)?,
        };

        let store = Arc::new(SqliteStore::new(pool.clone()));

        let queue = DispatchQueue::builder()
            .mailer(mailer)
            .reconciler(Reconciler::new(store.clone()))
            .batch_size(config.batch_size())
            .window(config.window())
            .build();

        let lifecycle = Lifecycle::builder()
            .store(store)
            .queue(queue)
            .renderer(Renderer::parse(config.survey_url())?)
            .sender(config.mail_from())
            .subject(config.mail_subject())
            .default_language(config.default_language())
            .build();

        tracing::info!(
            db_path = config.db_path(),
            batch_size = config.batch_size(),
            window_ms = config.window().as_millis() as u64,
            "Service ready"
        );

        Ok(Self {
            db: pool,
            config,
            lifecycle,
        })
    }
}

fn default_mailer(config: &Config) -> Result<Arc<dyn Mailer>, Error> {
    let Some(api_key) = config.sendgrid_api_key.clone() else {
        tracing::warn!("ONA_SENDGRID_API_KEY is not set, invitations will only be logged");
        return Ok(Arc::new(LogMailer));
    };

    let mailer = match &config.sendgrid_url {
        Some(url) => SendGridMailer::with_endpoint(api_key, config.mail_timeout(), url.clone()),
        None => SendGridMailer::new(api_key, config.mail_timeout()),
    }?;

    Ok(Arc::new(mailer))
}

impl Service {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &DispatchQueue {
        self.lifecycle.queue()
    }

    pub async fn create_survey(&self, name: impl AsRef<str>) -> Result<i64, Error> {
        let mut tx = self.db.begin().await?;

        let id = Survey::insert(tx.acquire().await?, name).await?;

        tx.commit().await?;

        Ok(id)
    }

    pub async fn delete_survey(&self, name: impl AsRef<str>) -> Result<(), Error> {
        let mut conn = self.db.acquire().await?;
        Survey::delete(&mut conn, name).await
    }

    pub async fn list_surveys(&self) -> Result<Vec<SurveyStatistics>, Error> {
        let mut conn = self.db.acquire().await?;
        Survey::list(&mut conn).await
    }

    /// Adds respondents in one transaction.
    ///
    /// # Returns
    /// The generated correlation keys, in input order.
    pub async fn add_respondents(
        &self,
        survey: impl AsRef<str>,
        respondents: &[NewRespondent],
    ) -> Result<Vec<CorrelationKey>, Error> {
        let mut tx = self.db.begin().await?;

        let survey = Survey::require_id(tx.acquire().await?, survey).await?;

        let mut keys = Vec::with_capacity(respondents.len());
        for respondent in respondents {
            keys.push(Respondent::insert(tx.acquire().await?, survey, respondent).await?);
        }

        tx.commit().await?;

        Ok(keys)
    }

    pub async fn list_respondents(
        &self,
        survey: impl AsRef<str>,
    ) -> Result<Vec<Respondent>, Error> {
        let mut conn = self.db.acquire().await?;
        Respondent::list(&mut conn, survey).await
    }

    pub async fn set_eligible(
        &self,
        survey: impl AsRef<str>,
        key: &CorrelationKey,
        eligible: bool,
    ) -> Result<(), Error> {
        let mut conn = self.db.acquire().await?;
        Respondent::set_eligible(&mut conn, survey, key, eligible).await
    }

    pub async fn set_template(
        &self,
        survey: impl AsRef<str>,
        language: impl AsRef<str>,
        body: impl AsRef<str>,
    ) -> Result<(), Error> {
        let mut conn = self.db.acquire().await?;
        Template::upsert(&mut conn, survey, language, body).await
    }

    pub async fn list_templates(&self, survey: impl AsRef<str>) -> Result<Vec<Template>, Error> {
        let mut conn = self.db.acquire().await?;
        Template::list(&mut conn, survey).await
    }

    /// Starts issuing invitations for `survey` without waiting for delivery.
    pub fn start_survey(&self, survey: impl Into<String>) -> JoinHandle<usize> {
        self.lifecycle.start_survey(survey)
    }

    /// Sends one test invitation without waiting for delivery.
    pub fn send_test_message(
        &self,
        recipient: Email,
        survey: impl Into<String>,
        language: impl Into<String>,
    ) -> JoinHandle<usize> {
        self.lifecycle.send_test_message(recipient, survey, language)
    }
}
