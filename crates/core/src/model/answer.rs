use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{AnswerId, QuestionId, SessionId};

/// What the question bank exposes about a question: its key, how many
/// alternatives it offers and the explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionKey {
    pub id: QuestionId,
    pub correct_index: u32,
    pub option_count: u32,
    pub explanation: Option<String>,
}

impl QuestionKey {
    /// Whether `chosen_index` names one of the alternatives.
    #[must_use]
    pub fn has_option(&self, chosen_index: u32) -> bool {
        chosen_index < self.option_count
    }

    #[must_use]
    pub fn is_correct(&self, chosen_index: u32) -> bool {
        chosen_index == self.correct_index
    }
}

/// A graded answer ready to be stored; storage assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub chosen_index: u32,
    pub correct: bool,
    pub response_seconds: u32,
    pub answered_at: DateTime<Utc>,
}

impl NewAnswer {
    /// Grade `chosen_index` against the question key.
    #[must_use]
    pub fn graded(
        session_id: SessionId,
        key: &QuestionKey,
        chosen_index: u32,
        response_seconds: u32,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            question_id: key.id,
            chosen_index,
            correct: key.is_correct(chosen_index),
            response_seconds,
            answered_at,
        }
    }
}

/// One recorded response within a session. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub id: AnswerId,
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub chosen_index: u32,
    pub correct: bool,
    pub response_seconds: u32,
    pub answered_at: DateTime<Utc>,
}

impl Answer {
    #[must_use]
    pub fn stored(id: AnswerId, new: NewAnswer) -> Self {
        Self {
            id,
            session_id: new.session_id,
            question_id: new.question_id,
            chosen_index: new.chosen_index,
            correct: new.correct,
            response_seconds: new.response_seconds,
            answered_at: new.answered_at,
        }
    }
}
