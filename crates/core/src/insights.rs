//! Ranked study recommendations derived from mastery metrics.
//!
//! Everything here is pure: the engine reads a snapshot and never stores or
//! mutates anything.

use serde::Serialize;

use crate::model::MasteryMetric;

/// Number of insights returned at most.
pub const MAX_INSIGHTS: usize = 5;
/// Below this smoothed accuracy a subject raises an alert.
pub const LOW_ACCURACY_THRESHOLD: f64 = 60.0;
/// Streak length (days) that earns praise.
pub const PRAISE_STREAK_DAYS: u32 = 7;
/// Below this many cumulative minutes a subject gets a study-time suggestion.
pub const MIN_STUDY_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Alert,
    Praise,
    Motivation,
    Suggestion,
}

/// Ordering is significant: `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub action: String,
    pub priority: Priority,
}

/// A metric paired with the display name of its subject.
#[derive(Debug, Clone, Copy)]
pub struct SubjectSnapshot<'a> {
    pub subject_name: &'a str,
    pub metric: &'a MasteryMetric,
}

fn subject_insights(snapshot: SubjectSnapshot<'_>, out: &mut Vec<Insight>) {
    let name = snapshot.subject_name;
    let metric = snapshot.metric;

    if metric.accuracy() < LOW_ACCURACY_THRESHOLD {
        out.push(Insight {
            kind: InsightKind::Alert,
            title: format!("Low accuracy in {name}"),
            description: format!(
                "Your accuracy in {name} is at {:.1}%. Consider reviewing the material.",
                metric.accuracy()
            ),
            action: "Review mind maps".into(),
            priority: Priority::High,
        });
    }

    if metric.streak_days() >= PRAISE_STREAK_DAYS {
        out.push(Insight {
            kind: InsightKind::Praise,
            title: format!("Excellent consistency in {name}!"),
            description: format!(
                "You have studied {name} for {} days in a row.",
                metric.streak_days()
            ),
            action: "Keep it up!".into(),
            priority: Priority::Low,
        });
    } else if metric.streak_days() == 0 {
        out.push(Insight {
            kind: InsightKind::Motivation,
            title: format!("How about studying {name} today?"),
            description: format!(
                "You have not studied {name} in a while. A quick session can help!"
            ),
            action: "Start training".into(),
            priority: Priority::Medium,
        });
    }

    if metric.study_minutes() < MIN_STUDY_MINUTES {
        out.push(Insight {
            kind: InsightKind::Suggestion,
            title: format!("Increase your study time in {name}"),
            description: format!(
                "You have studied only {} minutes of {name}. How about dedicating more time?",
                metric.study_minutes()
            ),
            action: "Create a study plan".into(),
            priority: Priority::Medium,
        });
    }
}

/// Evaluate every rule for every subject, rank by priority and keep the top
/// [`MAX_INSIGHTS`].
///
/// The sort is stable, so equal priorities keep subject order and rule order.
#[must_use]
pub fn generate<'a>(snapshots: impl IntoIterator<Item = SubjectSnapshot<'a>>) -> Vec<Insight> {
    let mut insights = Vec::new();
    for snapshot in snapshots {
        subject_insights(snapshot, &mut insights);
    }
    insights.sort_by_key(|insight| insight.priority);
    insights.truncate(MAX_INSIGHTS);
    insights
}
