use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use study_core::model::{
    Answer, AnswerId, MasteryMetric, NewAnswer, NewTrainingSession, QuestionId, QuestionKey,
    SessionId, SessionScore, SubjectId, TrainingSession, UserId, whole_minutes,
};
use study_core::{Conflict, EntityKind, NotFound};

use crate::repository::{
    AnswerRepository, FinalizedSession, MasteryFold, MasteryRepository, QuestionBank,
    RecordedAnswer, SessionClose, SessionOrder, SessionQuery, SessionRepository, StorageError,
    SubjectCatalog, TrainingPersistence, UserDirectory,
};

#[derive(Default)]
struct MemoryState {
    users: HashSet<UserId>,
    subjects: HashMap<SubjectId, String>,
    questions: HashMap<QuestionId, QuestionKey>,
    sessions: BTreeMap<SessionId, TrainingSession>,
    answers: Vec<Answer>,
    metrics: BTreeMap<(UserId, SubjectId), MasteryMetric>,
    last_session_id: u64,
    last_answer_id: u64,
}

impl MemoryState {
    fn active_session(&self, user_id: UserId) -> Option<&TrainingSession> {
        self.sessions
            .values()
            .find(|s| s.user_id() == user_id && !s.is_finalized())
    }

    fn score(&self, session_id: SessionId) -> SessionScore {
        let mut score = SessionScore::default();
        for answer in self.answers.iter().filter(|a| a.session_id == session_id) {
            score.total = score.total.saturating_add(1);
            if answer.correct {
                score.correct = score.correct.saturating_add(1);
            }
        }
        score
    }

    /// Computes the folded metric without storing it.
    fn folded_metric(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        fold: MasteryFold,
    ) -> Result<MasteryMetric, StorageError> {
        let mut metric = self
            .metrics
            .get(&(user_id, subject_id))
            .cloned()
            .unwrap_or_else(|| MasteryMetric::empty(user_id, subject_id, fold.at));
        metric
            .record_session(fold.minutes, fold.accuracy, fold.today, fold.at)
            .map_err(|e| StorageError::Invalid(e.to_string()))?;
        Ok(metric)
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// A single lock guards every table, so each trait call is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Register a user in the directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn add_user(&self, id: UserId) -> Result<(), StorageError> {
        self.lock()?.users.insert(id);
        Ok(())
    }

    /// Register a subject in the catalog.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn add_subject(&self, id: SubjectId, name: impl Into<String>) -> Result<(), StorageError> {
        self.lock()?.subjects.insert(id, name.into());
        Ok(())
    }

    /// Register a question in the bank.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn add_question(&self, key: QuestionKey) -> Result<(), StorageError> {
        self.lock()?.questions.insert(key.id, key);
        Ok(())
    }

    /// Remove a subject and cascade to its mastery metrics.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn remove_subject(&self, id: SubjectId) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.subjects.remove(&id);
        state.metrics.retain(|(_, subject), _| *subject != id);
        Ok(())
    }

    /// Overwrite a metric, e.g. to set up historical state in tests.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_metric(&self, metric: MasteryMetric) -> Result<(), StorageError> {
        self.lock()?
            .metrics
            .insert((metric.user_id(), metric.subject_id()), metric);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryRepository {
    async fn user_exists(&self, id: UserId) -> Result<bool, StorageError> {
        Ok(self.lock()?.users.contains(&id))
    }
}

#[async_trait]
impl SubjectCatalog for InMemoryRepository {
    async fn subject_exists(&self, id: SubjectId) -> Result<bool, StorageError> {
        Ok(self.lock()?.subjects.contains_key(&id))
    }

    async fn subject_name(&self, id: SubjectId) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.subjects.get(&id).cloned())
    }
}

#[async_trait]
impl QuestionBank for InMemoryRepository {
    async fn get_question(&self, id: QuestionId) -> Result<Option<QuestionKey>, StorageError> {
        Ok(self.lock()?.questions.get(&id).cloned())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn get_session(&self, id: SessionId) -> Result<Option<TrainingSession>, StorageError> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<TrainingSession>, StorageError> {
        Ok(self.lock()?.active_session(user_id).cloned())
    }

    async fn list_sessions(
        &self,
        query: &SessionQuery,
    ) -> Result<Vec<TrainingSession>, StorageError> {
        let state = self.lock()?;
        let mut out: Vec<TrainingSession> = state
            .sessions
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        match query.order {
            SessionOrder::StartedDesc => {
                out.sort_by(|a, b| (b.started_at(), b.id()).cmp(&(a.started_at(), a.id())));
            }
            SessionOrder::EndedDesc => {
                out.sort_by(|a, b| (b.ended_at(), b.id()).cmp(&(a.ended_at(), a.id())));
            }
        }
        if let Some(limit) = query.limit {
            out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(out)
    }

    async fn session_score(&self, id: SessionId) -> Result<SessionScore, StorageError> {
        Ok(self.lock()?.score(id))
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Answer>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .answers
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MasteryRepository for InMemoryRepository {
    async fn get_metric(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<MasteryMetric>, StorageError> {
        Ok(self.lock()?.metrics.get(&(user_id, subject_id)).cloned())
    }

    async fn metrics_for_user(&self, user_id: UserId) -> Result<Vec<MasteryMetric>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .metrics
            .values()
            .filter(|m| m.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn get_or_create_metric(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<MasteryMetric, StorageError> {
        let mut state = self.lock()?;
        let metric = state
            .metrics
            .entry((user_id, subject_id))
            .or_insert_with(|| MasteryMetric::empty(user_id, subject_id, at));
        Ok(metric.clone())
    }

    async fn fold_session(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        fold: MasteryFold,
    ) -> Result<MasteryMetric, StorageError> {
        let mut state = self.lock()?;
        let metric = state.folded_metric(user_id, subject_id, fold)?;
        state.metrics.insert((user_id, subject_id), metric.clone());
        Ok(metric)
    }
}

#[async_trait]
impl TrainingPersistence for InMemoryRepository {
    async fn open_session(&self, new: NewTrainingSession) -> Result<TrainingSession, StorageError> {
        let mut state = self.lock()?;
        if let Some(active) = state.active_session(new.user_id) {
            return Err(Conflict::ActiveSession {
                user_id: new.user_id,
                session_id: active.id(),
            }
            .into());
        }

        state.last_session_id += 1;
        let session = TrainingSession::opened(SessionId::new(state.last_session_id), &new);
        state.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    async fn record_answer(&self, answer: NewAnswer) -> Result<RecordedAnswer, StorageError> {
        let mut state = self.lock()?;
        let session_id = answer.session_id;

        let Some(session) = state.sessions.get(&session_id).filter(|s| !s.is_finalized()) else {
            return Err(NotFound::new(EntityKind::ActiveSession, session_id.value()).into());
        };
        let mut session = session.clone();

        let duplicate = state
            .answers
            .iter()
            .any(|a| a.session_id == session_id && a.question_id == answer.question_id);
        if duplicate {
            return Err(Conflict::DuplicateAnswer {
                session_id,
                question_id: answer.question_id,
            }
            .into());
        }

        session
            .record_item()
            .map_err(|e| StorageError::Invalid(e.to_string()))?;

        state.last_answer_id += 1;
        let stored = Answer::stored(AnswerId::new(state.last_answer_id), answer);
        state.answers.push(stored.clone());
        state.sessions.insert(session_id, session.clone());

        Ok(RecordedAnswer {
            answer: stored,
            session,
        })
    }

    async fn finalize_session(
        &self,
        id: SessionId,
        close: SessionClose,
    ) -> Result<FinalizedSession, StorageError> {
        let mut state = self.lock()?;

        let Some(session) = state.sessions.get(&id).filter(|s| !s.is_finalized()) else {
            return Err(NotFound::new(EntityKind::ActiveSession, id.value()).into());
        };
        let mut session = session.clone();

        let elapsed = session
            .finalize(close.ended_at)
            .map_err(|e| StorageError::Invalid(e.to_string()))?;
        let score = state.score(id);

        // Compute everything before writing so a rejected fold leaves no trace.
        let metric = match session.subject_id() {
            Some(subject_id) => Some(state.folded_metric(
                session.user_id(),
                subject_id,
                close.mastery_fold(whole_minutes(elapsed), score.accuracy()),
            )?),
            None => None,
        };

        if let Some(metric) = &metric {
            state
                .metrics
                .insert((metric.user_id(), metric.subject_id()), metric.clone());
        }
        state.sessions.insert(id, session.clone());

        Ok(FinalizedSession {
            session,
            score,
            metric,
        })
    }
}
