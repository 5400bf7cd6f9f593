use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::{QuestionId, SessionId, UserId};

/// A required field was missing or malformed.
///
/// Produced once at the request boundary; no mutation has happened when this is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn missing(field: &'static str) -> Self {
        Self::new(field, "field is required")
    }
}

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Subject,
    Question,
    Session,
    /// A session that exists but is already finalized counts as missing for
    /// operations that need an active one.
    ActiveSession,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::User => "user",
            EntityKind::Subject => "subject",
            EntityKind::Question => "question",
            EntityKind::Session => "session",
            EntityKind::ActiveSession => "active session",
        };
        f.write_str(name)
    }
}

/// An unknown user, subject, question or session.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[error("{entity} {id} not found")]
pub struct NotFound {
    pub entity: EntityKind,
    pub id: u64,
}

impl NotFound {
    #[must_use]
    pub fn new(entity: EntityKind, id: u64) -> Self {
        Self { entity, id }
    }
}

/// A mutation was rejected because it would break a uniqueness invariant.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Conflict {
    #[error("user {user_id} already has active session {session_id}")]
    ActiveSession {
        user_id: UserId,
        session_id: SessionId,
    },

    #[error("question {question_id} was already answered in session {session_id}")]
    DuplicateAnswer {
        session_id: SessionId,
        question_id: QuestionId,
    },
}
