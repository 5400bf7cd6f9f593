use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use storage::repository::{
    MasteryRepository, SessionQuery, SessionRepository, SubjectCatalog, UserDirectory,
};
use study_core::model::{
    MasteryMetric, MasteryRollup, SubjectId, TrainingSession, UserId, round_to, whole_minutes,
};
use study_core::{EntityKind, NotFound};

use crate::Clock;
use crate::error::TrainingError;

/// Finalized sessions listed alongside the per-user metrics.
pub const RECENT_SESSION_LIMIT: u32 = 10;
/// Window of the minutes-per-day chart.
pub const WEEK_DAYS: i64 = 7;
/// Length of the constancy strip.
pub const CONSTANCY_DAYS: i64 = 14;

//
// ─── READ MODELS ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectMetricView {
    pub subject_name: Option<String>,
    #[serde(flatten)]
    pub metric: MasteryMetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_minutes: u64,
    pub total_hours: f64,
    pub mean_accuracy: f64,
    pub longest_streak: u32,
    pub subjects_studied: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMetrics {
    pub user_id: UserId,
    pub subjects: Vec<SubjectMetricView>,
    pub summary: MetricsSummary,
    pub recent_sessions: Vec<TrainingSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectMetricDetail {
    pub subject_name: String,
    pub metric: MasteryMetric,
    pub sessions: Vec<TrainingSession>,
    pub session_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyMinutes {
    pub date: NaiveDate,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAccuracy {
    pub subject_id: SubjectId,
    pub subject_name: Option<String>,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConstancyDay {
    pub date: NaiveDate,
    pub studied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub total_hours: f64,
    pub mean_accuracy: f64,
    pub longest_streak: u32,
    /// Days with finalized sessions in the last week, oldest first.
    pub minutes_per_day: Vec<DailyMinutes>,
    pub accuracy_by_subject: Vec<SubjectAccuracy>,
    /// Oldest first, ending today.
    pub constancy: Vec<ConstancyDay>,
    pub subjects: Vec<SubjectMetricView>,
}

//
// ─── SERVICE ──────────────────────────────────────────────────────────────────
//

/// Read-side aggregation over metrics and finalized sessions.
#[derive(Clone)]
pub struct MetricsService {
    clock: Clock,
    users: Arc<dyn UserDirectory>,
    subjects: Arc<dyn SubjectCatalog>,
    sessions: Arc<dyn SessionRepository>,
    mastery: Arc<dyn MasteryRepository>,
}

impl MetricsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn UserDirectory>,
        subjects: Arc<dyn SubjectCatalog>,
        sessions: Arc<dyn SessionRepository>,
        mastery: Arc<dyn MasteryRepository>,
    ) -> Self {
        Self {
            clock,
            users,
            subjects,
            sessions,
            mastery,
        }
    }

    async fn require_user(&self, user_id: UserId) -> Result<(), TrainingError> {
        if self.users.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(NotFound::new(EntityKind::User, user_id.value()).into())
        }
    }

    async fn named(
        &self,
        metrics: Vec<MasteryMetric>,
    ) -> Result<Vec<SubjectMetricView>, TrainingError> {
        let mut views = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let subject_name = self.subjects.subject_name(metric.subject_id()).await?;
            views.push(SubjectMetricView {
                subject_name,
                metric,
            });
        }
        Ok(views)
    }

    /// Per-subject metrics, rollups and the latest finalized sessions.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` for an unknown user.
    pub async fn user_metrics(&self, user_id: UserId) -> Result<UserMetrics, TrainingError> {
        self.require_user(user_id).await?;

        let metrics = self.mastery.metrics_for_user(user_id).await?;
        let rollup = MasteryRollup::from_metrics(&metrics);
        let recent_sessions = self
            .sessions
            .list_sessions(&SessionQuery::finalized(user_id).limit(RECENT_SESSION_LIMIT))
            .await?;

        Ok(UserMetrics {
            user_id,
            subjects: self.named(metrics).await?,
            summary: MetricsSummary {
                total_minutes: rollup.total_minutes,
                total_hours: rollup.total_hours(),
                mean_accuracy: round_to(rollup.mean_accuracy, 2),
                longest_streak: rollup.longest_streak,
                subjects_studied: rollup.subjects_studied,
            },
            recent_sessions,
        })
    }

    /// The pair's metric, created with zero values on first access, and the
    /// subject's finalized sessions, most recently ended first.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` for an unknown user or subject.
    pub async fn subject_metric(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<SubjectMetricDetail, TrainingError> {
        self.require_user(user_id).await?;
        let subject_name = self
            .subjects
            .subject_name(subject_id)
            .await?
            .ok_or_else(|| NotFound::new(EntityKind::Subject, subject_id.value()))?;

        let metric = self
            .mastery
            .get_or_create_metric(user_id, subject_id, self.clock.now())
            .await?;
        let sessions = self
            .sessions
            .list_sessions(&SessionQuery::finalized(user_id).with_subject(subject_id))
            .await?;

        Ok(SubjectMetricDetail {
            subject_name,
            metric,
            session_count: sessions.len(),
            sessions,
        })
    }

    /// Chart data: rollups, last week's minutes per day, accuracy per subject
    /// and a two-week constancy strip.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` for an unknown user.
    pub async fn dashboard(&self, user_id: UserId) -> Result<Dashboard, TrainingError> {
        self.require_user(user_id).await?;

        let now = self.clock.now();
        let today = now.date_naive();
        let metrics = self.mastery.metrics_for_user(user_id).await?;
        let rollup = MasteryRollup::from_metrics(&metrics);

        let week_start = now - Duration::days(WEEK_DAYS);
        let strip_start = today - Duration::days(CONSTANCY_DAYS - 1);
        let since = strip_start
            .and_hms_opt(0, 0, 0)
            .map_or(week_start, |midnight| midnight.and_utc())
            .min(week_start);
        let finalized = self
            .sessions
            .list_sessions(&SessionQuery::finalized(user_id).ended_since(since))
            .await?;

        let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        let mut studied_days: BTreeSet<NaiveDate> = BTreeSet::new();
        for session in &finalized {
            let Some(ended_at) = session.ended_at() else {
                continue;
            };
            studied_days.insert(ended_at.date_naive());
            if ended_at >= week_start {
                let minutes = per_day.entry(ended_at.date_naive()).or_default();
                *minutes = minutes.saturating_add(whole_minutes(session.elapsed_seconds()));
            }
        }

        let constancy = (0..CONSTANCY_DAYS)
            .map(|offset| {
                let date = strip_start + Duration::days(offset);
                ConstancyDay {
                    date,
                    studied: studied_days.contains(&date),
                }
            })
            .collect();

        let subjects = self.named(metrics).await?;
        let accuracy_by_subject = subjects
            .iter()
            .map(|view| SubjectAccuracy {
                subject_id: view.metric.subject_id(),
                subject_name: view.subject_name.clone(),
                accuracy: view.metric.accuracy(),
            })
            .collect();

        Ok(Dashboard {
            total_hours: rollup.total_hours(),
            mean_accuracy: round_to(rollup.mean_accuracy, 1),
            longest_streak: rollup.longest_streak,
            minutes_per_day: per_day
                .into_iter()
                .map(|(date, minutes)| DailyMinutes { date, minutes })
                .collect(),
            accuracy_by_subject,
            constancy,
            subjects,
        })
    }
}
