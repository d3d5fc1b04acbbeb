//! The persistence interface consumed by the dispatch core.
//!
//! The lifecycle controller reads respondents and templates through
//! [`SurveyStore`], and the reconciler writes delivery acknowledgments back.
//! No transaction spans calls; each call is atomic on its own.

use std::{future::Future, pin::Pin};

use sqlx::SqlitePool;

use crate::{
    db::{
        respondent::{Recipient, Respondent},
        survey::Survey,
        template::Template,
    },
    error::Error,
    message::CorrelationKey,
};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

pub trait SurveyStore: Send + Sync + 'static {
    /// Respondents of `survey` flagged eligible for invitations.
    fn eligible_respondents<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, Vec<Recipient>>;

    /// Per-language invitation texts of `survey`.
    fn templates<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, Vec<Template>>;

    /// Marks every respondent in `keys` as invited.
    fn mark_delivered<'a>(&'a self, keys: &'a [CorrelationKey]) -> StoreFuture<'a, u64>;

    /// Records that invitations for `survey` have been issued.
    fn mark_notified<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, ()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

impl SurveyStore for SqliteStore {
    fn eligible_respondents<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, Vec<Recipient>> {
        Box::pin(async move {
            let mut conn = self.db.acquire().await?;
            Respondent::eligible(&mut conn, survey).await
        })
    }

    fn templates<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, Vec<Template>> {
        Box::pin(async move {
            let mut conn = self.db.acquire().await?;
            Template::list(&mut conn, survey).await
        })
    }

    fn mark_delivered<'a>(&'a self, keys: &'a [CorrelationKey]) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut conn = self.db.acquire().await?;
            Respondent::mark_delivered(&mut conn, keys).await
        })
    }

    fn mark_notified<'a>(&'a self, survey: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.db.acquire().await?;
            Survey::mark_notified(&mut conn, survey).await
        })
    }
}
