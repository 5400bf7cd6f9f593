use std::sync::Arc;

use storage::repository::{
    SessionClose, SessionQuery, SessionRepository, SubjectCatalog, TrainingPersistence,
    UserDirectory,
};
use study_core::model::{NewTrainingSession, SessionId, TrainingSession, UserId};
use study_core::{Conflict, EntityKind, NotFound};

use super::view::{FinalizeSummary, SessionView};
use crate::Clock;
use crate::error::TrainingError;
use crate::requests::StartSession;

/// Owns the session lifecycle: start, finalize and reads.
///
/// Finalizing folds the session into the subject's mastery metric inside the
/// same storage transaction.
#[derive(Clone)]
pub struct SessionManager {
    clock: Clock,
    users: Arc<dyn UserDirectory>,
    subjects: Arc<dyn SubjectCatalog>,
    sessions: Arc<dyn SessionRepository>,
    training: Arc<dyn TrainingPersistence>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn UserDirectory>,
        subjects: Arc<dyn SubjectCatalog>,
        sessions: Arc<dyn SessionRepository>,
        training: Arc<dyn TrainingPersistence>,
    ) -> Self {
        Self {
            clock,
            users,
            subjects,
            sessions,
            training,
        }
    }

    async fn require_user(&self, user_id: UserId) -> Result<(), TrainingError> {
        if self.users.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(NotFound::new(EntityKind::User, user_id.value()).into())
        }
    }

    /// Open a new active session for the user.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` for an unknown user or subject,
    /// `TrainingError::Conflict` carrying the active session id if the user
    /// already has one open.
    pub async fn start(&self, cmd: StartSession) -> Result<TrainingSession, TrainingError> {
        self.require_user(cmd.user_id).await?;
        if let Some(subject_id) = cmd.subject_id {
            if !self.subjects.subject_exists(subject_id).await? {
                return Err(NotFound::new(EntityKind::Subject, subject_id.value()).into());
            }
        }

        let session = match self
            .training
            .open_session(NewTrainingSession {
                user_id: cmd.user_id,
                kind: cmd.kind,
                subject_id: cmd.subject_id,
                target_count: cmd.target_count,
                started_at: self.clock.now(),
            })
            .await
        {
            Ok(session) => session,
            Err(err) => {
                let err = TrainingError::from(err);
                if let TrainingError::Conflict(Conflict::ActiveSession { session_id, .. }) = &err {
                    tracing::warn!(
                        user_id = cmd.user_id.value(),
                        active_session_id = session_id.value(),
                        "start rejected: session already active"
                    );
                }
                return Err(err);
            }
        };

        tracing::info!(
            session_id = session.id().value(),
            user_id = cmd.user_id.value(),
            kind = %cmd.kind,
            "session started"
        );
        Ok(session)
    }

    /// Close an active session, score it and fold it into the subject metric.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` if no active session has this id,
    /// including one that is already finalized.
    pub async fn finalize(&self, session_id: SessionId) -> Result<FinalizeSummary, TrainingError> {
        let done = self
            .training
            .finalize_session(session_id, SessionClose::at(self.clock.now()))
            .await?;

        let summary = FinalizeSummary::new(done.session, done.score, done.metric);
        tracing::info!(
            session_id = session_id.value(),
            accuracy = summary.accuracy,
            minutes = summary.elapsed_minutes,
            "session finalized"
        );
        Ok(summary)
    }

    /// Current state of one session.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` for an unknown session.
    pub async fn get(&self, session_id: SessionId) -> Result<SessionView, TrainingError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| NotFound::new(EntityKind::Session, session_id.value()))?;
        let score = self.sessions.session_score(session_id).await?;
        let subject_name = match session.subject_id() {
            Some(subject_id) => self.subjects.subject_name(subject_id).await?,
            None => None,
        };
        Ok(SessionView::new(session, score, subject_name))
    }

    /// Every session of the user, newest start first.
    ///
    /// # Errors
    ///
    /// Returns `TrainingError::NotFound` for an unknown user.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TrainingSession>, TrainingError> {
        self.require_user(user_id).await?;
        Ok(self
            .sessions
            .list_sessions(&SessionQuery::for_user(user_id))
            .await?)
    }
}
