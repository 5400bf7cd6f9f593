use chrono::{DateTime, Utc};
use sqlx::Row;
use study_core::model::{QuestionId, QuestionKey, SubjectId, UserId};

use super::mapping::{
    map_question_key_row, question_id_from_i64, ser, subject_id_from_i64, to_i64,
    user_id_from_i64,
};
use super::{SqliteRepository, conn_err};
use crate::repository::{QuestionBank, StorageError, SubjectCatalog, UserDirectory};

/// A multiple-choice question as stored in the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestionRecord {
    pub subject_id: SubjectId,
    pub prompt: String,
    pub alternatives: Vec<String>,
    pub correct_index: u32,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Catalog writes used by seeding and tests. Each call is idempotent on the
/// natural key (username, subject name, subject + prompt).
impl SqliteRepository {
    /// # Errors
    ///
    /// Returns `StorageError` if the insert or lookup fails.
    pub async fn ensure_user(
        &self,
        username: &str,
        created_at: DateTime<Utc>,
    ) -> Result<UserId, StorageError> {
        sqlx::query(
            r"
            INSERT INTO users (username, created_at)
            VALUES (?1, ?2)
            ON CONFLICT(username) DO NOTHING
            ",
        )
        .bind(username)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = ?1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(conn_err)?;
        user_id_from_i64(id)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the insert or lookup fails.
    pub async fn ensure_subject(
        &self,
        name: &str,
        color: &str,
        created_at: DateTime<Utc>,
    ) -> Result<SubjectId, StorageError> {
        sqlx::query(
            r"
            INSERT INTO subjects (name, color, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO NOTHING
            ",
        )
        .bind(name)
        .bind(color)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM subjects WHERE name = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(conn_err)?;
        subject_id_from_i64(id)
    }

    /// # Errors
    ///
    /// Returns `StorageError::Invalid` if the correct index does not point at an
    /// alternative, or other storage errors.
    pub async fn ensure_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let in_range = usize::try_from(question.correct_index)
            .is_ok_and(|idx| idx < question.alternatives.len());
        if !in_range {
            return Err(StorageError::Invalid(format!(
                "correct_index {} outside {} alternatives",
                question.correct_index,
                question.alternatives.len()
            )));
        }

        let subject = to_i64("subject_id", question.subject_id.value())?;
        let alternatives = serde_json::to_string(&question.alternatives).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO questions (subject_id, prompt, alternatives, correct_index, explanation, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6
            WHERE NOT EXISTS (
                SELECT 1 FROM questions WHERE subject_id = ?1 AND prompt = ?2
            )
            ",
        )
        .bind(subject)
        .bind(&question.prompt)
        .bind(alternatives)
        .bind(i64::from(question.correct_index))
        .bind(&question.explanation)
        .bind(question.created_at)
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        let id: i64 = sqlx::query_scalar(
            "SELECT id FROM questions WHERE subject_id = ?1 AND prompt = ?2 ORDER BY id LIMIT 1",
        )
        .bind(subject)
        .bind(&question.prompt)
        .fetch_one(&self.pool)
        .await
        .map_err(conn_err)?;
        question_id_from_i64(id)
    }

    /// Alternatives of a stored question, in display order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored list is malformed.
    pub async fn question_alternatives(
        &self,
        id: QuestionId,
    ) -> Result<Option<Vec<String>>, StorageError> {
        let row = sqlx::query("SELECT alternatives FROM questions WHERE id = ?1")
            .bind(to_i64("question_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        row.map(|row| {
            let raw: String = row.try_get("alternatives").map_err(ser)?;
            serde_json::from_str(&raw).map_err(ser)
        })
        .transpose()
    }
}

#[async_trait::async_trait]
impl UserDirectory for SqliteRepository {
    async fn user_exists(&self, id: UserId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?1")
            .bind(to_i64("user_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;
        Ok(row.is_some())
    }
}

#[async_trait::async_trait]
impl SubjectCatalog for SqliteRepository {
    async fn subject_exists(&self, id: SubjectId) -> Result<bool, StorageError> {
        Ok(self.subject_name(id).await?.is_some())
    }

    async fn subject_name(&self, id: SubjectId) -> Result<Option<String>, StorageError> {
        sqlx::query_scalar("SELECT name FROM subjects WHERE id = ?1")
            .bind(to_i64("subject_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)
    }
}

#[async_trait::async_trait]
impl QuestionBank for SqliteRepository {
    async fn get_question(&self, id: QuestionId) -> Result<Option<QuestionKey>, StorageError> {
        let row = sqlx::query(
            "SELECT id, correct_index, json_array_length(alternatives) AS option_count, explanation
             FROM questions WHERE id = ?1",
        )
            .bind(to_i64("question_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        row.as_ref().map(map_question_key_row).transpose()
    }
}
