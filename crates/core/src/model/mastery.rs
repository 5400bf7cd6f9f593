use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{SubjectId, UserId};

/// Weight of the stored history when folding in a new session accuracy.
pub const HISTORY_WEIGHT: f64 = 0.7;
/// Weight of the newest session accuracy.
pub const SESSION_WEIGHT: f64 = 0.3;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum MasteryError {
    #[error("accuracy must be within 0..=100, got {0}")]
    InvalidAccuracy(f64),
}

fn check_accuracy(value: f64) -> Result<f64, MasteryError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(MasteryError::InvalidAccuracy(value))
    }
}

//
// ─── STREAK & SMOOTHING ───────────────────────────────────────────────────────
//

/// Streak length after counting activity on `today`.
///
/// - no prior activity: 1
/// - same day: unchanged
/// - the day after: +1
/// - any longer gap: back to 1
///
/// A `today` earlier than the last activity leaves the streak unchanged.
#[must_use]
pub fn next_streak(last_activity: Option<NaiveDate>, streak: u32, today: NaiveDate) -> u32 {
    let Some(last) = last_activity else {
        return 1;
    };
    match (today - last).num_days() {
        1 => streak.saturating_add(1),
        gap if gap > 1 => 1,
        _ => streak,
    }
}

/// Exponentially smoothed accuracy.
///
/// A stored value of exactly `0.0` is read as "no history" and replaced outright,
/// which also swallows a genuine 0% history.
#[must_use]
pub fn smooth_accuracy(stored: f64, new_accuracy: f64) -> f64 {
    if stored == 0.0 {
        new_accuracy
    } else {
        HISTORY_WEIGHT * stored + SESSION_WEIGHT * new_accuracy
    }
}

//
// ─── METRIC ───────────────────────────────────────────────────────────────────
//

/// Running mastery statistics for one (user, subject) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasteryMetric {
    user_id: UserId,
    subject_id: SubjectId,
    study_minutes: u32,
    accuracy: f64,
    streak_days: u32,
    last_activity: Option<NaiveDate>,
    updated_at: DateTime<Utc>,
}

impl MasteryMetric {
    /// A zeroed metric for a pair that has never been studied.
    #[must_use]
    pub fn empty(user_id: UserId, subject_id: SubjectId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            subject_id,
            study_minutes: 0,
            accuracy: 0.0,
            streak_days: 0,
            last_activity: None,
            updated_at: at,
        }
    }

    /// Rehydrate a metric from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::InvalidAccuracy` if the stored accuracy is out of range.
    pub fn from_persisted(
        user_id: UserId,
        subject_id: SubjectId,
        study_minutes: u32,
        accuracy: f64,
        streak_days: u32,
        last_activity: Option<NaiveDate>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, MasteryError> {
        Ok(Self {
            user_id,
            subject_id,
            study_minutes,
            accuracy: check_accuracy(accuracy)?,
            streak_days,
            last_activity,
            updated_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn study_minutes(&self) -> u32 {
        self.study_minutes
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    #[must_use]
    pub fn streak_days(&self) -> u32 {
        self.streak_days
    }

    #[must_use]
    pub fn last_activity(&self) -> Option<NaiveDate> {
        self.last_activity
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Fold one finalized session into the metric.
    ///
    /// Minutes are added even when zero; the streak and last-activity date are
    /// always refreshed for `today`.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::InvalidAccuracy` without touching the metric when
    /// `accuracy` is outside `0..=100`.
    pub fn record_session(
        &mut self,
        minutes: u32,
        accuracy: f64,
        today: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<(), MasteryError> {
        let accuracy = check_accuracy(accuracy)?;

        self.study_minutes = self.study_minutes.saturating_add(minutes);
        self.streak_days = next_streak(self.last_activity, self.streak_days, today);
        self.last_activity = Some(today);
        self.accuracy = smooth_accuracy(self.accuracy, accuracy).clamp(0.0, 100.0);
        self.updated_at = at;
        Ok(())
    }
}

//
// ─── ROLLUP ───────────────────────────────────────────────────────────────────
//

/// Round half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Totals across all subjects of one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MasteryRollup {
    pub total_minutes: u64,
    pub mean_accuracy: f64,
    pub longest_streak: u32,
    pub subjects_studied: usize,
}

impl MasteryRollup {
    #[must_use]
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a MasteryMetric>) -> Self {
        let mut rollup = Self::default();
        let mut accuracy_sum = 0.0;
        for metric in metrics {
            rollup.total_minutes += u64::from(metric.study_minutes());
            rollup.longest_streak = rollup.longest_streak.max(metric.streak_days());
            rollup.subjects_studied += 1;
            accuracy_sum += metric.accuracy();
        }
        if rollup.subjects_studied > 0 {
            #[allow(clippy::cast_precision_loss)]
            let count = rollup.subjects_studied as f64;
            rollup.mean_accuracy = accuracy_sum / count;
        }
        rollup
    }

    /// Total study time in hours, rounded to one decimal.
    #[must_use]
    pub fn total_hours(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let minutes = self.total_minutes as f64;
        round_to(minutes / 60.0, 1)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
