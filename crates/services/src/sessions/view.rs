use serde::Serialize;
use study_core::model::{
    AnswerId, MasteryMetric, SessionScore, SessionState, TrainingSession, whole_minutes,
};

/// Read model of one session with its live score.
///
/// Presentation-agnostic: timestamps stay typed, accuracy stays unrounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: TrainingSession,
    pub state: SessionState,
    pub subject_name: Option<String>,
    pub accuracy: f64,
    pub correct_count: u32,
    pub total_count: u32,
}

impl SessionView {
    #[must_use]
    pub fn new(session: TrainingSession, score: SessionScore, subject_name: Option<String>) -> Self {
        Self {
            state: session.state(),
            session,
            subject_name,
            accuracy: score.accuracy(),
            correct_count: score.correct,
            total_count: score.total,
        }
    }
}

/// Outcome of closing a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizeSummary {
    pub session: TrainingSession,
    pub accuracy: f64,
    pub elapsed_minutes: u32,
    pub correct_count: u32,
    pub total_count: u32,
    /// Subject metric after the fold; absent for subject-less sessions.
    pub metric: Option<MasteryMetric>,
}

impl FinalizeSummary {
    pub(crate) fn new(
        session: TrainingSession,
        score: SessionScore,
        metric: Option<MasteryMetric>,
    ) -> Self {
        Self {
            elapsed_minutes: whole_minutes(session.elapsed_seconds()),
            session,
            accuracy: score.accuracy(),
            correct_count: score.correct,
            total_count: score.total,
            metric,
        }
    }
}

/// Immediate feedback for one recorded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerFeedback {
    pub answer_id: AnswerId,
    pub correct: bool,
    pub correct_index: u32,
    pub explanation: Option<String>,
    pub completed: u32,
    pub target: u32,
}
