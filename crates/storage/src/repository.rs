use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use study_core::model::{
    Answer, MasteryMetric, NewAnswer, NewTrainingSession, QuestionId, QuestionKey, SessionId,
    SessionScore, SubjectId, TrainingSession, UserId,
};
use study_core::{Conflict, NotFound};
use thiserror::Error;

use crate::memory::InMemoryRepository;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error(transparent)]
    NotFound(#[from] NotFound),

    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ──────────────────────────────────────────────────────────────────
//

/// Ordering for session listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionOrder {
    /// Most recently started first.
    #[default]
    StartedDesc,
    /// Most recently finalized first.
    EndedDesc,
}

/// Filter for listing a user's sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuery {
    pub user_id: UserId,
    pub subject_id: Option<SubjectId>,
    pub finalized_only: bool,
    pub ended_since: Option<DateTime<Utc>>,
    pub order: SessionOrder,
    pub limit: Option<u32>,
}

impl SessionQuery {
    /// Every session of the user, newest start first.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            subject_id: None,
            finalized_only: false,
            ended_since: None,
            order: SessionOrder::StartedDesc,
            limit: None,
        }
    }

    /// Finalized sessions of the user, most recently ended first.
    #[must_use]
    pub fn finalized(user_id: UserId) -> Self {
        Self {
            finalized_only: true,
            order: SessionOrder::EndedDesc,
            ..Self::for_user(user_id)
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject_id: SubjectId) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    #[must_use]
    pub fn ended_since(mut self, since: DateTime<Utc>) -> Self {
        self.ended_since = Some(since);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-memory evaluation of the filter part of the query.
    #[must_use]
    pub fn matches(&self, session: &TrainingSession) -> bool {
        if session.user_id() != self.user_id {
            return false;
        }
        if self.subject_id.is_some() && session.subject_id() != self.subject_id {
            return false;
        }
        if self.finalized_only && !session.is_finalized() {
            return false;
        }
        match (self.ended_since, session.ended_at()) {
            (Some(since), Some(ended)) => ended >= since,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// One finalized session folded into a mastery metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasteryFold {
    pub minutes: u32,
    pub accuracy: f64,
    pub today: NaiveDate,
    pub at: DateTime<Utc>,
}

impl MasteryFold {
    /// A fold stamped at `at`, whose UTC date counts as "today" for the streak.
    #[must_use]
    pub fn at(minutes: u32, accuracy: f64, at: DateTime<Utc>) -> Self {
        Self {
            minutes,
            accuracy,
            today: at.date_naive(),
            at,
        }
    }
}

/// Clock readings used to close a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClose {
    pub ended_at: DateTime<Utc>,
    pub today: NaiveDate,
}

impl SessionClose {
    #[must_use]
    pub fn at(ended_at: DateTime<Utc>) -> Self {
        Self {
            ended_at,
            today: ended_at.date_naive(),
        }
    }

    /// The fold a finalized session with this close applies to its subject
    /// metric; the same rule `MasteryRepository::fold_session` applies.
    #[must_use]
    pub fn mastery_fold(self, minutes: u32, accuracy: f64) -> MasteryFold {
        MasteryFold {
            minutes,
            accuracy,
            today: self.today,
            at: self.ended_at,
        }
    }
}

/// Outcome of recording an answer: the stored answer and the updated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAnswer {
    pub answer: Answer,
    pub session: TrainingSession,
}

/// Outcome of finalizing a session.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedSession {
    pub session: TrainingSession,
    pub score: SessionScore,
    /// The subject's metric after folding, `None` for subject-less sessions.
    pub metric: Option<MasteryMetric>,
}

//
// ─── COLLABORATORS ────────────────────────────────────────────────────────────
//

/// Existence checks against the user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn user_exists(&self, id: UserId) -> Result<bool, StorageError>;
}

/// Existence and name lookups against the subject catalog.
#[async_trait]
pub trait SubjectCatalog: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn subject_exists(&self, id: SubjectId) -> Result<bool, StorageError>;

    /// Display name, `None` for an unknown subject.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn subject_name(&self, id: SubjectId) -> Result<Option<String>, StorageError>;
}

/// Answer-key lookups against the question bank.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_question(&self, id: QuestionId) -> Result<Option<QuestionKey>, StorageError>;
}

//
// ─── REPOSITORIES ─────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fetch a session by ID, finalized or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn get_session(&self, id: SessionId) -> Result<Option<TrainingSession>, StorageError>;

    /// The user's unfinalized session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn active_session(&self, user_id: UserId)
    -> Result<Option<TrainingSession>, StorageError>;

    /// List sessions matching the query.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn list_sessions(&self, query: &SessionQuery)
    -> Result<Vec<TrainingSession>, StorageError>;

    /// Correct/total counts over the session's answers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn session_score(&self, id: SessionId) -> Result<SessionScore, StorageError>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Answers of a session in the order they were recorded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn answers_for_session(&self, session_id: SessionId)
    -> Result<Vec<Answer>, StorageError>;
}

#[async_trait]
pub trait MasteryRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn get_metric(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<MasteryMetric>, StorageError>;

    /// All metrics of a user ordered by subject ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn metrics_for_user(&self, user_id: UserId) -> Result<Vec<MasteryMetric>, StorageError>;

    /// Fetch the pair's metric, inserting a zeroed one when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or write failures.
    async fn get_or_create_metric(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<MasteryMetric, StorageError>;

    /// Read-modify-write of one metric, serialized against concurrent folds of the same pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Invalid` if the fold is rejected by the metric,
    /// or other storage errors. Nothing is written on error.
    async fn fold_session(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        fold: MasteryFold,
    ) -> Result<MasteryMetric, StorageError>;
}

/// Atomic training-session mutations.
///
/// Each call is one all-or-nothing unit of work.
#[async_trait]
pub trait TrainingPersistence: Send + Sync {
    /// Insert a new active session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict(Conflict::ActiveSession)` if the user already
    /// has an unfinalized session.
    async fn open_session(&self, new: NewTrainingSession) -> Result<TrainingSession, StorageError>;

    /// Store an answer and bump the session's completed count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing or finalized,
    /// `StorageError::Conflict(Conflict::DuplicateAnswer)` if the question was
    /// already answered in this session.
    async fn record_answer(&self, answer: NewAnswer) -> Result<RecordedAnswer, StorageError>;

    /// Close an active session, score it and fold it into the subject metric.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no active session has this ID.
    async fn finalize_session(
        &self,
        id: SessionId,
        close: SessionClose,
    ) -> Result<FinalizedSession, StorageError>;
}

/// Marker for backends that implement every repository and collaborator.
pub trait Backend:
    UserDirectory
    + SubjectCatalog
    + QuestionBank
    + SessionRepository
    + AnswerRepository
    + MasteryRepository
    + TrainingPersistence
    + Clone
    + 'static
{
}

impl<T> Backend for T where
    T: UserDirectory
        + SubjectCatalog
        + QuestionBank
        + SessionRepository
        + AnswerRepository
        + MasteryRepository
        + TrainingPersistence
        + Clone
        + 'static
{
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserDirectory>,
    pub subjects: Arc<dyn SubjectCatalog>,
    pub questions: Arc<dyn QuestionBank>,
    pub sessions: Arc<dyn SessionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub mastery: Arc<dyn MasteryRepository>,
    pub training: Arc<dyn TrainingPersistence>,
}

impl Storage {
    /// Share one backend across every repository slot.
    #[must_use]
    pub fn from_backend<B: Backend>(backend: B) -> Self {
        Self {
            users: Arc::new(backend.clone()),
            subjects: Arc::new(backend.clone()),
            questions: Arc::new(backend.clone()),
            sessions: Arc::new(backend.clone()),
            answers: Arc::new(backend.clone()),
            mastery: Arc::new(backend.clone()),
            training: Arc::new(backend),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }
}
