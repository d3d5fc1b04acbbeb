//! Writes delivery acknowledgments back to the respondent store.

use std::sync::Arc;

use crate::{message::CorrelationKey, store::SurveyStore};

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn SurveyStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SurveyStore>) -> Self {
        Self { store }
    }

    /// Marks `delivered` respondents as invited with a single store update.
    ///
    /// An empty set issues no store call. Store failures are logged and
    /// swallowed: the messages are already out and the drain loop must go on.
    pub async fn reconcile(&self, delivered: &[CorrelationKey]) {
        if delivered.is_empty() {
            return;
        }

        match self.store.mark_delivered(delivered).await {
            Ok(updated) => {
                tracing::debug!(
                    delivered = delivered.len(),
                    updated,
                    "Reconciled delivery status"
                );
                if updated < delivered.len() as u64 {
                    tracing::warn!(
                        delivered = delivered.len(),
                        updated,
                        "Some delivered respondents no longer exist"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    delivered = delivered.len(),
                    error = ?e,
                    "Failed to record delivery status"
                );
            }
        }
    }
}
