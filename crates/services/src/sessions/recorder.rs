use std::sync::Arc;

use storage::repository::{QuestionBank, SessionRepository, TrainingPersistence};
use study_core::model::NewAnswer;
use study_core::{Conflict, EntityKind, NotFound, ValidationError};

use super::view::AnswerFeedback;
use crate::Clock;
use crate::error::TrainingError;
use crate::requests::RecordAnswer;

/// Records answers against active sessions, at most once per question.
#[derive(Clone)]
pub struct AnswerRecorder {
    clock: Clock,
    questions: Arc<dyn QuestionBank>,
    sessions: Arc<dyn SessionRepository>,
    training: Arc<dyn TrainingPersistence>,
}

impl AnswerRecorder {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionBank>,
        sessions: Arc<dyn SessionRepository>,
        training: Arc<dyn TrainingPersistence>,
    ) -> Self {
        Self {
            clock,
            questions,
            sessions,
            training,
        }
    }

    /// Grade and store one answer, bumping the session's completed count.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` if the session is missing or finalized
    /// or the question is unknown, `TrainingError::Validation` if
    /// `chosen_index` is past the question's alternatives,
    /// `TrainingError::Conflict` if the question was already answered in this
    /// session.
    pub async fn record(&self, cmd: RecordAnswer) -> Result<AnswerFeedback, TrainingError> {
        let active = self
            .sessions
            .get_session(cmd.session_id)
            .await?
            .filter(|s| !s.is_finalized());
        if active.is_none() {
            return Err(NotFound::new(EntityKind::ActiveSession, cmd.session_id.value()).into());
        }

        let key = self
            .questions
            .get_question(cmd.question_id)
            .await?
            .ok_or_else(|| NotFound::new(EntityKind::Question, cmd.question_id.value()))?;
        if !key.has_option(cmd.chosen_index) {
            return Err(ValidationError::new(
                "chosen_index",
                format!(
                    "option index out of range: {} (question has {} alternatives)",
                    cmd.chosen_index, key.option_count
                ),
            )
            .into());
        }

        let answer = NewAnswer::graded(
            cmd.session_id,
            &key,
            cmd.chosen_index,
            cmd.response_seconds,
            self.clock.now(),
        );
        let recorded = match self.training.record_answer(answer).await {
            Ok(recorded) => recorded,
            Err(err) => {
                let err = TrainingError::from(err);
                if let TrainingError::Conflict(Conflict::DuplicateAnswer { .. }) = &err {
                    tracing::warn!(
                        session_id = cmd.session_id.value(),
                        question_id = cmd.question_id.value(),
                        "answer rejected: question already answered"
                    );
                }
                return Err(err);
            }
        };

        tracing::debug!(
            session_id = cmd.session_id.value(),
            question_id = cmd.question_id.value(),
            correct = recorded.answer.correct,
            completed = recorded.session.completed_count(),
            "answer recorded"
        );
        Ok(AnswerFeedback {
            answer_id: recorded.answer.id,
            correct: recorded.answer.correct,
            correct_index: key.correct_index,
            explanation: key.explanation,
            completed: recorded.session.completed_count(),
            target: recorded.session.target_count(),
        })
    }
}
