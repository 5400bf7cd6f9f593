use chrono::{DateTime, Utc};
use study_core::model::{
    Answer, NewAnswer, NewTrainingSession, SessionId, TrainingSession, elapsed_seconds,
    whole_minutes,
};
use study_core::{Conflict, EntityKind, NotFound};

use super::mapping::{answer_id_from_i64, session_id_from_i64, to_i64};
use super::mastery_repo::fold_in_tx;
use super::session_repo::{fetch_score, fetch_session};
use super::{SqliteRepository, conn_err, is_unique_violation};
use crate::repository::{
    FinalizedSession, RecordedAnswer, SessionClose, StorageError, TrainingPersistence,
};

fn active_not_found(id: SessionId) -> StorageError {
    NotFound::new(EntityKind::ActiveSession, id.value()).into()
}

#[async_trait::async_trait]
impl TrainingPersistence for SqliteRepository {
    async fn open_session(&self, new: NewTrainingSession) -> Result<TrainingSession, StorageError> {
        let user = to_i64("user_id", new.user_id.value())?;
        let subject = new
            .subject_id
            .map(|s| to_i64("subject_id", s.value()))
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        let inserted = sqlx::query(
            r"
            INSERT INTO training_sessions (user_id, kind, subject_id, target_count, completed_count, elapsed_seconds, started_at, ended_at, finalized)
            VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, NULL, 0)
            ",
        )
        .bind(user)
        .bind(new.kind.as_str())
        .bind(subject)
        .bind(i64::from(new.target_count))
        .bind(new.started_at)
        .execute(&mut *tx)
        .await;

        let res = match inserted {
            Ok(res) => res,
            Err(e) if is_unique_violation(&e) => {
                // The partial unique index rejected a second active session.
                let active: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM training_sessions WHERE user_id = ?1 AND finalized = 0",
                )
                .bind(user)
                .fetch_optional(&mut *tx)
                .await
                .map_err(conn_err)?;

                return match active {
                    Some(id) => Err(Conflict::ActiveSession {
                        user_id: new.user_id,
                        session_id: session_id_from_i64(id)?,
                    }
                    .into()),
                    None => Err(StorageError::Invalid(
                        "active-session index violated without an active row".into(),
                    )),
                };
            }
            Err(e) => return Err(conn_err(e)),
        };

        tx.commit().await.map_err(conn_err)?;

        let id = session_id_from_i64(res.last_insert_rowid())?;
        tracing::debug!(
            session_id = id.value(),
            user_id = new.user_id.value(),
            kind = %new.kind,
            "training session opened"
        );
        Ok(TrainingSession::opened(id, &new))
    }

    async fn record_answer(&self, answer: NewAnswer) -> Result<RecordedAnswer, StorageError> {
        let session_id = answer.session_id;
        let sid = to_i64("session_id", session_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        // Claim the session first; a finalized or missing row matches nothing.
        let claimed = sqlx::query(
            r"
            UPDATE training_sessions
            SET completed_count = completed_count + 1
            WHERE id = ?1 AND finalized = 0
            ",
        )
        .bind(sid)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;
        if claimed.rows_affected() == 0 {
            return Err(active_not_found(session_id));
        }

        let inserted = sqlx::query(
            r"
            INSERT INTO answers (session_id, question_id, chosen_index, correct, response_seconds, answered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(sid)
        .bind(to_i64("question_id", answer.question_id.value())?)
        .bind(i64::from(answer.chosen_index))
        .bind(i64::from(answer.correct))
        .bind(i64::from(answer.response_seconds))
        .bind(answer.answered_at)
        .execute(&mut *tx)
        .await;

        // Dropping `tx` on the error paths rolls back the count bump.
        let res = match inserted {
            Ok(res) => res,
            Err(e) if is_unique_violation(&e) => {
                return Err(Conflict::DuplicateAnswer {
                    session_id,
                    question_id: answer.question_id,
                }
                .into());
            }
            Err(e) => return Err(conn_err(e)),
        };
        let answer_id = answer_id_from_i64(res.last_insert_rowid())?;

        let session = fetch_session(&mut *tx, session_id)
            .await?
            .ok_or_else(|| active_not_found(session_id))?;

        tx.commit().await.map_err(conn_err)?;

        Ok(RecordedAnswer {
            answer: Answer::stored(answer_id, answer),
            session,
        })
    }

    async fn finalize_session(
        &self,
        id: SessionId,
        close: SessionClose,
    ) -> Result<FinalizedSession, StorageError> {
        let sid = to_i64("session_id", id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        // Claim the transition; of two concurrent finalizations exactly one matches.
        let claimed = sqlx::query(
            "UPDATE training_sessions SET finalized = 1 WHERE id = ?1 AND finalized = 0",
        )
        .bind(sid)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;
        if claimed.rows_affected() == 0 {
            return Err(active_not_found(id));
        }

        let started_at: DateTime<Utc> =
            sqlx::query_scalar("SELECT started_at FROM training_sessions WHERE id = ?1")
                .bind(sid)
                .fetch_one(&mut *tx)
                .await
                .map_err(conn_err)?;
        let ended_at = close.ended_at.max(started_at);
        let elapsed = elapsed_seconds(started_at, ended_at);

        sqlx::query(
            "UPDATE training_sessions SET ended_at = ?2, elapsed_seconds = ?3 WHERE id = ?1",
        )
        .bind(sid)
        .bind(ended_at)
        .bind(to_i64("elapsed_seconds", elapsed)?)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        let score = fetch_score(&mut *tx, id).await?;
        let session = fetch_session(&mut *tx, id)
            .await?
            .ok_or_else(|| active_not_found(id))?;

        let metric = match session.subject_id() {
            Some(subject_id) => Some(
                fold_in_tx(
                    &mut *tx,
                    session.user_id(),
                    subject_id,
                    close.mastery_fold(whole_minutes(elapsed), score.accuracy()),
                )
                .await?,
            ),
            None => None,
        };

        tx.commit().await.map_err(conn_err)?;

        tracing::info!(
            session_id = id.value(),
            elapsed_seconds = elapsed,
            correct = score.correct,
            total = score.total,
            "training session finalized"
        );
        Ok(FinalizedSession {
            session,
            score,
            metric,
        })
    }
}
