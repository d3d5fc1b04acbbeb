use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, SqliteConnection};

use crate::{error::Error, template::normalize_language};

use super::survey::Survey;

/// Invitation text of one survey in one language.
#[derive(Serialize, Deserialize, FromRow, Debug, Clone, PartialEq)]
pub struct Template {
    pub language: String,
    pub body: String,
}

impl Template {
    /// Inserts or replaces the survey's template for `language`.
    pub async fn upsert(
        db: &mut SqliteConnection,
        survey: impl AsRef<str>,
        language: impl AsRef<str>,
        body: impl AsRef<str>,
    ) -> Result<(), Error> {
        let survey = Survey::require_id(&mut *db, survey).await?;

        sqlx::query(
            "
            INSERT INTO templates (survey, language, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (survey, language) DO UPDATE SET body = excluded.body
            ",
        )
        .bind(survey)
        .bind(normalize_language(language.as_ref()))
        .bind(body.as_ref())
        .execute(db)
        .await?;

        Ok(())
    }

    /// All templates of a survey. An unknown survey has none.
    pub async fn list(
        db: &mut SqliteConnection,
        survey: impl AsRef<str>,
    ) -> Result<Vec<Template>, Error> {
        Ok(sqlx::query_as(
            "
            SELECT t.language, t.body
            FROM templates t
            JOIN surveys s ON t.survey = s.id
            WHERE s.name = $1
            ORDER BY t.language
            ",
        )
        .bind(survey.as_ref())
        .fetch_all(db)
        .await?)
    }
}
