use std::sync::Arc;

use storage::repository::{MasteryRepository, SubjectCatalog, UserDirectory};
use study_core::insights::{self, Insight, SubjectSnapshot};
use study_core::model::UserId;
use study_core::{EntityKind, NotFound};

use crate::error::TrainingError;

/// Snapshot the user's metrics and run the insight rules over them.
///
/// Read-only: metrics are never created or touched here.
#[derive(Clone)]
pub struct InsightService {
    users: Arc<dyn UserDirectory>,
    subjects: Arc<dyn SubjectCatalog>,
    mastery: Arc<dyn MasteryRepository>,
}

impl InsightService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserDirectory>,
        subjects: Arc<dyn SubjectCatalog>,
        mastery: Arc<dyn MasteryRepository>,
    ) -> Self {
        Self {
            users,
            subjects,
            mastery,
        }
    }

    /// At most five insights, high priority first.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` for an unknown user.
    pub async fn generate(&self, user_id: UserId) -> Result<Vec<Insight>, TrainingError> {
        if !self.users.user_exists(user_id).await? {
            return Err(NotFound::new(EntityKind::User, user_id.value()).into());
        }

        let metrics = self.mastery.metrics_for_user(user_id).await?;
        let mut names = Vec::with_capacity(metrics.len());
        for metric in &metrics {
            let name = self
                .subjects
                .subject_name(metric.subject_id())
                .await?
                .unwrap_or_else(|| format!("subject {}", metric.subject_id()));
            names.push(name);
        }

        let ranked = insights::generate(names.iter().zip(&metrics).map(|(name, metric)| {
            SubjectSnapshot {
                subject_name: name,
                metric,
            }
        }));
        tracing::debug!(user_id = user_id.value(), count = ranked.len(), "insights generated");
        Ok(ranked)
    }
}
