use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, SqliteConnection};
use tokio_stream::StreamExt;

use crate::error::Error;

/// Advisory notification state of a survey. Not enforced by a lock: starting
/// an already notified survey sends invitations again.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum SurveyStatus {
    /// No invitations have been issued yet
    #[serde(rename = "draft")]
    #[sqlx(rename = "draft")]
    Draft,
    /// Invitations were issued at least once
    #[serde(rename = "notified")]
    #[sqlx(rename = "notified")]
    Notified,
}

#[derive(Serialize, Deserialize, FromRow, Debug)]
pub struct Survey {
    pub id: i64,
    pub name: String,
    pub status: SurveyStatus,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl PartialEq for Survey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Serialize, Deserialize, FromRow, Debug)]
pub struct SurveyStatistics {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub survey: Survey,
    pub respondent_count: i64,
    pub invited_count: i64,
}

impl Survey {
    pub async fn insert(db: &mut SqliteConnection, name: impl AsRef<str>) -> Result<i64, Error> {
        let existing = Self::get_id(&mut *db, &name).await?;
        if existing.is_some() {
            return Err(Error::invalid_parameter(format!(
                "survey {} already exists",
                name.as_ref()
            )));
        }

        Ok(sqlx::query_scalar(
            "INSERT INTO surveys (name, status, created_at) VALUES ($1, 'draft', $2) RETURNING id",
        )
        .bind(name.as_ref())
        .bind(Utc::now())
        .fetch_one(db)
        .await?)
    }

    pub async fn get_id(
        db: &mut SqliteConnection,
        name: impl AsRef<str>,
    ) -> Result<Option<i64>, Error> {
        Ok(sqlx::query_scalar("SELECT id FROM surveys WHERE name = $1")
            .bind(name.as_ref())
            .fetch_optional(db)
            .await?)
    }

    /// Like [`Self::get_id`], but an unknown survey is an error.
    pub async fn require_id(db: &mut SqliteConnection, name: impl AsRef<str>) -> Result<i64, Error> {
        Self::get_id(db, &name)
            .await?
            .ok_or_else(|| Error::survey_not_found(name.as_ref()))
    }

    pub async fn delete(db: &mut SqliteConnection, name: impl AsRef<str>) -> Result<(), Error> {
        let res = sqlx::query("DELETE FROM surveys WHERE name = $1")
            .bind(name.as_ref())
            .execute(db)
            .await?;

        if res.rows_affected() == 0 {
            return Err(Error::survey_not_found(name.as_ref()));
        }

        Ok(())
    }

    pub async fn list(db: &mut SqliteConnection) -> Result<Vec<SurveyStatistics>, Error> {
        let mut stream = sqlx::query_as(
            "
            SELECT
                s.id, s.name, s.status, s.created_at, s.notified_at,
                COUNT(r.id) AS respondent_count,
                COALESCE(SUM(r.invitation_sent), 0) AS invited_count
            FROM surveys s
            LEFT JOIN respondents r ON r.survey = s.id
            GROUP BY s.id
            ORDER BY s.id
            ",
        )
        .fetch(db);

        let mut surveys = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            surveys.push(res);
        }

        Ok(surveys)
    }

    /// Moves the survey to [`SurveyStatus::Notified`] and stamps the time.
    pub async fn mark_notified(
        db: &mut SqliteConnection,
        name: impl AsRef<str>,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE surveys SET status = 'notified', notified_at = $2 WHERE name = $1")
            .bind(name.as_ref())
            .bind(Utc::now())
            .execute(db)
            .await?;

        Ok(())
    }
}
