use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::metrics::{InsightService, MasteryMetricAggregator, MetricsService};
use crate::sessions::{AnswerRecorder, SessionManager};

/// Assembles the training and metrics services over one storage backend.
#[derive(Clone)]
pub struct TrainingServices {
    storage: Storage,
    sessions: Arc<SessionManager>,
    answers: Arc<AnswerRecorder>,
    aggregator: Arc<MasteryMetricAggregator>,
    metrics: Arc<MetricsService>,
    insights: Arc<InsightService>,
}

impl TrainingServices {
    #[must_use]
    pub fn new(storage: Storage, clock: Clock) -> Self {
        let sessions = Arc::new(SessionManager::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.subjects),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.training),
        ));
        let answers = Arc::new(AnswerRecorder::new(
            clock,
            Arc::clone(&storage.questions),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.training),
        ));
        let aggregator = Arc::new(MasteryMetricAggregator::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.subjects),
            Arc::clone(&storage.mastery),
        ));
        let metrics = Arc::new(MetricsService::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.subjects),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.mastery),
        ));
        let insights = Arc::new(InsightService::new(
            Arc::clone(&storage.users),
            Arc::clone(&storage.subjects),
            Arc::clone(&storage.mastery),
        ));

        Self {
            storage,
            sessions,
            answers,
            aggregator,
            metrics,
            insights,
        }
    }

    /// Build services backed by `SQLite` storage, running migrations first.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(storage, clock))
    }

    /// Same storage, different clock.
    #[must_use]
    pub fn with_clock(&self, clock: Clock) -> Self {
        Self::new(self.storage.clone(), clock)
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn answers(&self) -> Arc<AnswerRecorder> {
        Arc::clone(&self.answers)
    }

    #[must_use]
    pub fn aggregator(&self) -> Arc<MasteryMetricAggregator> {
        Arc::clone(&self.aggregator)
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsService> {
        Arc::clone(&self.metrics)
    }

    #[must_use]
    pub fn insights(&self) -> Arc<InsightService> {
        Arc::clone(&self.insights)
    }
}
