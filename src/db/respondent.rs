use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use sqlx::{prelude::FromRow, SqliteConnection};
use tokio_stream::StreamExt;

use crate::{error::Error, message::CorrelationKey, template::normalize_language};

use super::survey::Survey;

#[derive(Serialize, Deserialize, FromRow, Debug)]
pub struct Respondent {
    pub id: i64,
    pub email: String,
    pub correlation_key: CorrelationKey,
    pub language: String,
    pub eligible: bool,
    pub invitation_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Addressing data of one eligible respondent.
#[derive(Serialize, Deserialize, FromRow, Debug, Clone, PartialEq)]
pub struct Recipient {
    pub email: String,
    pub correlation_key: CorrelationKey,
    pub language: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewRespondent {
    pub email: Email,
    pub language: String,
    #[serde(default = "default_eligible")]
    pub eligible: bool,
}

fn default_eligible() -> bool {
    true
}

impl Respondent {
    /// Inserts a respondent with a freshly generated correlation key.
    pub async fn insert(
        db: &mut SqliteConnection,
        survey: i64,
        respondent: &NewRespondent,
    ) -> Result<CorrelationKey, Error> {
        let key = CorrelationKey::generate()?;

        sqlx::query(
            "
            INSERT INTO respondents (survey, email, correlation_key, language, eligible)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(survey)
        .bind(respondent.email.to_string())
        .bind(&key)
        .bind(normalize_language(&respondent.language))
        .bind(respondent.eligible)
        .execute(db)
        .await?;

        Ok(key)
    }

    pub async fn list(
        db: &mut SqliteConnection,
        survey: impl AsRef<str>,
    ) -> Result<Vec<Respondent>, Error> {
        let survey = Survey::require_id(&mut *db, survey).await?;

        let mut stream = sqlx::query_as(
            "
            SELECT id, email, correlation_key, language, eligible, invitation_sent, sent_at
            FROM respondents
            WHERE survey = $1
            ORDER BY id
            ",
        )
        .bind(survey)
        .fetch(db);

        let mut respondents = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            respondents.push(res);
        }

        Ok(respondents)
    }

    /// Eligible respondents of a survey, in insertion order. An unknown survey
    /// has none.
    pub async fn eligible(
        db: &mut SqliteConnection,
        survey: impl AsRef<str>,
    ) -> Result<Vec<Recipient>, Error> {
        let mut stream = sqlx::query_as(
            "
            SELECT r.email, r.correlation_key, r.language
            FROM respondents r
            JOIN surveys s ON r.survey = s.id
            WHERE s.name = $1 AND r.eligible = 1
            ORDER BY r.id
            ",
        )
        .bind(survey.as_ref())
        .fetch(db);

        let mut recipients = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            recipients.push(res);
        }

        Ok(recipients)
    }

    pub async fn set_eligible(
        db: &mut SqliteConnection,
        survey: impl AsRef<str>,
        key: &CorrelationKey,
        eligible: bool,
    ) -> Result<(), Error> {
        let res = sqlx::query(
            "
            UPDATE respondents
            SET eligible = $3
            WHERE correlation_key = $2
            AND survey IN (SELECT id FROM surveys WHERE name = $1)
            ",
        )
        .bind(survey.as_ref())
        .bind(key)
        .bind(eligible)
        .execute(db)
        .await?;

        if res.rows_affected() == 0 {
            return Err(Error::respondent_not_found(key.as_str(), survey.as_ref()));
        }

        Ok(())
    }

    /// Flags every respondent in `keys` as invited, in one statement.
    ///
    /// # Returns
    /// The number of respondent rows updated.
    pub async fn mark_delivered(
        db: &mut SqliteConnection,
        keys: &[CorrelationKey],
    ) -> Result<u64, Error> {
        if keys.is_empty() {
            return Ok(0);
        }

        let placeholders = (0..keys.len()).map(|i| format!("${}", i + 2)).join(", ");

        let sql = format!(
            "
            UPDATE respondents
            SET invitation_sent = 1, sent_at = $1
            WHERE correlation_key IN ({placeholders})
            "
        );

        let mut query = sqlx::query(&sql).bind(Utc::now());
        for key in keys {
            query = query.bind(key);
        }

        Ok(query.execute(db).await?.rows_affected())
    }
}
