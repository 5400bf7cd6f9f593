//! Loosely-typed request payloads and their validated forms.
//!
//! Payloads deserialize from arbitrary JSON objects with every field optional
//! and integers signed; `validate` runs once and yields a typed command or the
//! first offending field.

use serde::Deserialize;
use study_core::ValidationError;
use study_core::model::{
    DEFAULT_TARGET_COUNT, QuestionId, SessionId, SessionKind, SubjectId, UserId,
};

fn positive_id(field: &'static str, raw: Option<i64>) -> Result<u64, ValidationError> {
    let raw = raw.ok_or_else(|| ValidationError::missing(field))?;
    u64::try_from(raw)
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ValidationError::new(field, format!("expected a positive id, got {raw}")))
}

fn non_negative(field: &'static str, raw: i64) -> Result<u32, ValidationError> {
    u32::try_from(raw)
        .map_err(|_| ValidationError::new(field, format!("expected a non-negative count, got {raw}")))
}

//
// ─── START SESSION ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: Option<i64>,
    pub kind: Option<String>,
    pub subject_id: Option<i64>,
    pub target_count: Option<i64>,
}

/// A validated `StartSessionRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartSession {
    pub user_id: UserId,
    pub kind: SessionKind,
    pub subject_id: Option<SubjectId>,
    pub target_count: u32,
}

impl StartSessionRequest {
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first missing or malformed field.
    pub fn validate(&self) -> Result<StartSession, ValidationError> {
        let user_id = UserId::new(positive_id("user_id", self.user_id)?);

        let kind = self
            .kind
            .as_deref()
            .ok_or_else(|| ValidationError::missing("kind"))?
            .parse::<SessionKind>()
            .map_err(|e| ValidationError::new("kind", e.to_string()))?;

        let subject_id = self
            .subject_id
            .map(|raw| positive_id("subject_id", Some(raw)).map(SubjectId::new))
            .transpose()?;

        let target_count = self
            .target_count
            .map_or(Ok(DEFAULT_TARGET_COUNT), |raw| {
                non_negative("target_count", raw)
            })?;

        Ok(StartSession {
            user_id,
            kind,
            subject_id,
            target_count,
        })
    }
}

//
// ─── RECORD ANSWER ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordAnswerRequest {
    pub session_id: Option<i64>,
    pub question_id: Option<i64>,
    pub chosen_index: Option<i64>,
    pub response_seconds: Option<i64>,
}

/// A validated `RecordAnswerRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordAnswer {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub chosen_index: u32,
    pub response_seconds: u32,
}

impl RecordAnswerRequest {
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first missing or malformed field.
    pub fn validate(&self) -> Result<RecordAnswer, ValidationError> {
        let session_id = SessionId::new(positive_id("session_id", self.session_id)?);
        let question_id = QuestionId::new(positive_id("question_id", self.question_id)?);

        let chosen_index = self
            .chosen_index
            .ok_or_else(|| ValidationError::missing("chosen_index"))?;
        let chosen_index = u32::try_from(chosen_index).map_err(|_| {
            ValidationError::new(
                "chosen_index",
                format!("option index out of range: {chosen_index}"),
            )
        })?;

        let response_seconds = self
            .response_seconds
            .map_or(Ok(0), |raw| non_negative("response_seconds", raw))?;

        Ok(RecordAnswer {
            session_id,
            question_id,
            chosen_index,
            response_seconds,
        })
    }
}
