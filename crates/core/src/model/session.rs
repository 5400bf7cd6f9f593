use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{SessionId, SubjectId, UserId};

/// Items a session targets when the caller does not say otherwise.
pub const DEFAULT_TARGET_COUNT: u32 = 10;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session {0} is already finalized")]
    AlreadyFinalized(SessionId),

    #[error("unknown session kind: {0}")]
    UnknownKind(String),

    #[error("persisted session {id} is inconsistent: {reason}")]
    InvalidPersistedState { id: SessionId, reason: &'static str },
}

//
// ─── KIND ─────────────────────────────────────────────────────────────────────
//

/// What the user is drilling in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Questions,
    Flashcards,
    Mindmaps,
}

impl SessionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Questions => "questions",
            SessionKind::Flashcards => "flashcards",
            SessionKind::Mindmaps => "mindmaps",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "questions" => Ok(SessionKind::Questions),
            "flashcards" => Ok(SessionKind::Flashcards),
            "mindmaps" => Ok(SessionKind::Mindmaps),
            other => Err(SessionStateError::UnknownKind(other.to_owned())),
        }
    }
}

//
// ─── STATE ────────────────────────────────────────────────────────────────────
//

/// Lifecycle position of a session. Transitions only `Active -> Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Finalized,
}

/// Whole seconds between `started_at` and `ended_at`, truncated and clamped at zero.
#[must_use]
pub fn elapsed_seconds(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u64 {
    u64::try_from(ended_at.signed_duration_since(started_at).num_seconds()).unwrap_or(0)
}

/// Whole minutes contained in `seconds`.
#[must_use]
pub fn whole_minutes(seconds: u64) -> u32 {
    u32::try_from(seconds / 60).unwrap_or(u32::MAX)
}

//
// ─── NEW SESSION ──────────────────────────────────────────────────────────────
//

/// A validated request to open a session; storage assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrainingSession {
    pub user_id: UserId,
    pub kind: SessionKind,
    pub subject_id: Option<SubjectId>,
    pub target_count: u32,
    pub started_at: DateTime<Utc>,
}

//
// ─── SESSION ──────────────────────────────────────────────────────────────────
//

/// One bounded study attempt.
///
/// Created active, counts completed items while active, and is frozen once finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingSession {
    id: SessionId,
    user_id: UserId,
    kind: SessionKind,
    subject_id: Option<SubjectId>,
    target_count: u32,
    completed_count: u32,
    elapsed_seconds: u64,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    finalized: bool,
}

impl TrainingSession {
    /// Materialize a freshly inserted session.
    #[must_use]
    pub fn opened(id: SessionId, new: &NewTrainingSession) -> Self {
        Self {
            id,
            user_id: new.user_id,
            kind: new.kind,
            subject_id: new.subject_id,
            target_count: new.target_count,
            completed_count: 0,
            elapsed_seconds: 0,
            started_at: new.started_at,
            ended_at: None,
            finalized: false,
        }
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPersistedState` if the finalized flag and
    /// end timestamp disagree, or the end precedes the start.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        kind: SessionKind,
        subject_id: Option<SubjectId>,
        target_count: u32,
        completed_count: u32,
        elapsed_seconds: u64,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        finalized: bool,
    ) -> Result<Self, SessionStateError> {
        match ended_at {
            None if finalized => {
                return Err(SessionStateError::InvalidPersistedState {
                    id,
                    reason: "finalized without end timestamp",
                });
            }
            Some(_) if !finalized => {
                return Err(SessionStateError::InvalidPersistedState {
                    id,
                    reason: "active with end timestamp",
                });
            }
            Some(end) if end < started_at => {
                return Err(SessionStateError::InvalidPersistedState {
                    id,
                    reason: "ended before it started",
                });
            }
            _ => {}
        }

        Ok(Self {
            id,
            user_id,
            kind,
            subject_id,
            target_count,
            completed_count,
            elapsed_seconds,
            started_at,
            ended_at,
            finalized,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    #[must_use]
    pub fn subject_id(&self) -> Option<SubjectId> {
        self.subject_id
    }

    #[must_use]
    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    #[must_use]
    pub fn completed_count(&self) -> u32 {
        self.completed_count
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.finalized {
            SessionState::Finalized
        } else {
            SessionState::Active
        }
    }

    /// Count one more completed item. There is no cap at `target_count`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::AlreadyFinalized` once the session is closed.
    pub fn record_item(&mut self) -> Result<u32, SessionStateError> {
        if self.finalized {
            return Err(SessionStateError::AlreadyFinalized(self.id));
        }
        self.completed_count = self.completed_count.saturating_add(1);
        Ok(self.completed_count)
    }

    /// Close the session at `ended_at`, returning the elapsed whole seconds.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::AlreadyFinalized` if the session was closed before.
    pub fn finalize(&mut self, ended_at: DateTime<Utc>) -> Result<u64, SessionStateError> {
        if self.finalized {
            return Err(SessionStateError::AlreadyFinalized(self.id));
        }
        let elapsed = elapsed_seconds(self.started_at, ended_at);
        self.ended_at = Some(ended_at.max(self.started_at));
        self.elapsed_seconds = elapsed;
        self.finalized = true;
        Ok(elapsed)
    }
}

//
// ─── SCORE ────────────────────────────────────────────────────────────────────
//

/// Correct/total answer counts of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionScore {
    pub correct: u32,
    pub total: u32,
}

impl SessionScore {
    #[must_use]
    pub fn new(correct: u32, total: u32) -> Self {
        Self { correct, total }
    }

    /// Percentage of correct answers, `0.0` when nothing was answered.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * f64::from(self.correct) / f64::from(self.total)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
