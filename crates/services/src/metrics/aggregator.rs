use std::sync::Arc;

use storage::repository::{MasteryFold, MasteryRepository, SubjectCatalog, UserDirectory};
use study_core::model::{MasteryMetric, SubjectId, UserId};
use study_core::{EntityKind, NotFound, ValidationError};

use crate::Clock;
use crate::error::TrainingError;

/// Folds session outcomes into the per-(user, subject) mastery metric.
///
/// The streak and smoothing rules live on [`MasteryMetric::record_session`];
/// this service validates input, resolves "today" from the clock and hands the
/// read-modify-write to storage as one unit.
///
/// `SessionManager::finalize` applies the same fold inside the finalize
/// transaction (see `SessionClose::mastery_fold`), so closing a session and
/// the metric update commit or roll back together.
#[derive(Clone)]
pub struct MasteryMetricAggregator {
    clock: Clock,
    users: Arc<dyn UserDirectory>,
    subjects: Arc<dyn SubjectCatalog>,
    mastery: Arc<dyn MasteryRepository>,
}

impl MasteryMetricAggregator {
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn UserDirectory>,
        subjects: Arc<dyn SubjectCatalog>,
        mastery: Arc<dyn MasteryRepository>,
    ) -> Self {
        Self {
            clock,
            users,
            subjects,
            mastery,
        }
    }

    /// Add `minutes` and one accuracy sample to the pair's metric, creating it
    /// when absent.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::Validation` if `accuracy` is not a finite value in
    /// `0..=100`, `TrainingError::NotFound` for an unknown user or subject.
    pub async fn update(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        minutes: u32,
        accuracy: f64,
    ) -> Result<MasteryMetric, TrainingError> {
        if !accuracy.is_finite() || !(0.0..=100.0).contains(&accuracy) {
            return Err(ValidationError::new(
                "accuracy",
                format!("expected a percentage between 0 and 100, got {accuracy}"),
            )
            .into());
        }
        if !self.users.user_exists(user_id).await? {
            return Err(NotFound::new(EntityKind::User, user_id.value()).into());
        }
        if !self.subjects.subject_exists(subject_id).await? {
            return Err(NotFound::new(EntityKind::Subject, subject_id.value()).into());
        }

        let metric = self
            .mastery
            .fold_session(
                user_id,
                subject_id,
                MasteryFold::at(minutes, accuracy, self.clock.now()),
            )
            .await?;

        tracing::info!(
            user_id = user_id.value(),
            subject_id = subject_id.value(),
            minutes = metric.study_minutes(),
            accuracy = metric.accuracy(),
            streak = metric.streak_days(),
            "mastery metric updated"
        );
        Ok(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storage::memory::InMemoryRepository;
    use study_core::time::fixed_now;

    fn aggregator(repo: &InMemoryRepository, clock: Clock) -> MasteryMetricAggregator {
        let repo = Arc::new(repo.clone());
        MasteryMetricAggregator::new(clock, repo.clone(), repo.clone(), repo)
    }

    fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.add_user(UserId::new(1)).unwrap();
        repo.add_subject(SubjectId::new(2), "Physics").unwrap();
        repo
    }

    #[tokio::test]
    async fn first_update_replaces_and_later_updates_smooth() {
        let repo = seeded();
        let day0 = aggregator(&repo, Clock::fixed(fixed_now()));

        let first = day0
            .update(UserId::new(1), SubjectId::new(2), 30, 80.0)
            .await
            .unwrap();
        assert_eq!(first.accuracy(), 80.0);
        assert_eq!(first.streak_days(), 1);

        let day1 = aggregator(&repo, Clock::fixed(fixed_now() + Duration::days(1)));
        let second = day1
            .update(UserId::new(1), SubjectId::new(2), 0, 40.0)
            .await
            .unwrap();
        assert!((second.accuracy() - 68.0).abs() < 1e-9);
        assert_eq!(second.streak_days(), 2);
        assert_eq!(second.study_minutes(), 30);
    }

    #[tokio::test]
    async fn same_day_keeps_streak_and_gap_resets_it() {
        let repo = seeded();
        let day0 = aggregator(&repo, Clock::fixed(fixed_now()));
        day0.update(UserId::new(1), SubjectId::new(2), 5, 50.0)
            .await
            .unwrap();
        let again = day0
            .update(UserId::new(1), SubjectId::new(2), 5, 50.0)
            .await
            .unwrap();
        assert_eq!(again.streak_days(), 1);

        let later = aggregator(&repo, Clock::fixed(fixed_now() + Duration::days(3)));
        let reset = later
            .update(UserId::new(1), SubjectId::new(2), 5, 50.0)
            .await
            .unwrap();
        assert_eq!(reset.streak_days(), 1);
        assert_eq!(reset.study_minutes(), 15);
    }

    #[tokio::test]
    async fn rejects_bad_accuracy_without_writing() {
        let repo = seeded();
        let agg = aggregator(&repo, Clock::fixed(fixed_now()));

        for bad in [-1.0, 100.5, f64::NAN, f64::INFINITY] {
            let err = agg
                .update(UserId::new(1), SubjectId::new(2), 10, bad)
                .await
                .unwrap_err();
            assert!(matches!(err, TrainingError::Validation(_)));
        }
        let stored = repo
            .get_metric(UserId::new(1), SubjectId::new(2))
            .await
            .unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn unknown_subject_is_not_found() {
        let repo = seeded();
        let agg = aggregator(&repo, Clock::fixed(fixed_now()));
        let err = agg
            .update(UserId::new(1), SubjectId::new(9), 10, 50.0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrainingError::NotFound(NotFound {
                entity: EntityKind::Subject,
                id: 9
            })
        ));
    }
}
