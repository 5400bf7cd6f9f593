use study_core::model::{Answer, SessionId, SessionScore, TrainingSession, UserId};

use super::mapping::{SESSION_COLUMNS, map_answer_row, map_session_row, ser, to_i64};
use super::{SqliteRepository, conn_err};
use crate::repository::{
    AnswerRepository, SessionOrder, SessionQuery, SessionRepository, StorageError,
};

/// Load one session by id with any executor, pool or open transaction.
pub(crate) async fn fetch_session<'e, E>(
    executor: E,
    id: SessionId,
) -> Result<Option<TrainingSession>, StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = format!("SELECT {SESSION_COLUMNS} FROM training_sessions WHERE id = ?1");
    let row = sqlx::query(&sql)
        .bind(to_i64("session_id", id.value())?)
        .fetch_optional(executor)
        .await
        .map_err(conn_err)?;

    row.as_ref().map(map_session_row).transpose()
}

/// Correct/total counts over a session's answers.
pub(crate) async fn fetch_score<'e, E>(
    executor: E,
    id: SessionId,
) -> Result<SessionScore, StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let (total, correct): (i64, i64) = sqlx::query_as(
        r"
        SELECT COUNT(*), COALESCE(SUM(correct), 0)
        FROM answers
        WHERE session_id = ?1
        ",
    )
    .bind(to_i64("session_id", id.value())?)
    .fetch_one(executor)
    .await
    .map_err(conn_err)?;

    Ok(SessionScore::new(
        u32::try_from(correct).map_err(ser)?,
        u32::try_from(total).map_err(ser)?,
    ))
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn get_session(&self, id: SessionId) -> Result<Option<TrainingSession>, StorageError> {
        fetch_session(&self.pool, id).await
    }

    async fn active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<TrainingSession>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM training_sessions WHERE user_id = ?1 AND finalized = 0"
        );
        let row = sqlx::query(&sql)
            .bind(to_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn list_sessions(
        &self,
        query: &SessionQuery,
    ) -> Result<Vec<TrainingSession>, StorageError> {
        let order = match query.order {
            SessionOrder::StartedDesc => "started_at DESC, id DESC",
            SessionOrder::EndedDesc => "ended_at DESC, id DESC",
        };
        let sql = format!(
            r"
            SELECT {SESSION_COLUMNS}
            FROM training_sessions
            WHERE user_id = ?1
              AND (?2 IS NULL OR subject_id = ?2)
              AND (?3 = 0 OR finalized = 1)
              AND (?4 IS NULL OR (ended_at IS NOT NULL AND julianday(ended_at) >= julianday(?4)))
            ORDER BY {order}
            LIMIT ?5
            "
        );

        let subject = query
            .subject_id
            .map(|s| to_i64("subject_id", s.value()))
            .transpose()?;
        // SQLite treats a negative LIMIT as unbounded.
        let limit = query.limit.map_or(-1, i64::from);

        let rows = sqlx::query(&sql)
            .bind(to_i64("user_id", query.user_id.value())?)
            .bind(subject)
            .bind(i64::from(query.finalized_only))
            .bind(query.ended_since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(conn_err)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(map_session_row(&row)?);
        }
        Ok(sessions)
    }

    async fn session_score(&self, id: SessionId) -> Result<SessionScore, StorageError> {
        fetch_score(&self.pool, id).await
    }
}

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Answer>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, session_id, question_id, chosen_index, correct, response_seconds, answered_at
            FROM answers
            WHERE session_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(to_i64("session_id", session_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        let mut answers = Vec::with_capacity(rows.len());
        for row in rows {
            answers.push(map_answer_row(&row)?);
        }
        Ok(answers)
    }
}
