use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use study_core::model::{MasteryMetric, SubjectId, UserId};

use super::mapping::{map_metric_row, to_i64};
use super::{SqliteRepository, conn_err};
use crate::repository::{MasteryFold, MasteryRepository, StorageError};

const METRIC_COLUMNS: &str =
    "user_id, subject_id, study_minutes, accuracy, streak_days, last_activity, updated_at";

async fn fetch_metric<'e, E>(
    executor: E,
    user_id: UserId,
    subject_id: SubjectId,
) -> Result<Option<MasteryMetric>, StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = format!(
        "SELECT {METRIC_COLUMNS} FROM mastery_metrics WHERE user_id = ?1 AND subject_id = ?2"
    );
    let row = sqlx::query(&sql)
        .bind(to_i64("user_id", user_id.value())?)
        .bind(to_i64("subject_id", subject_id.value())?)
        .fetch_optional(executor)
        .await
        .map_err(conn_err)?;

    row.as_ref().map(map_metric_row).transpose()
}

/// Insert a zeroed metric unless the pair already has one.
async fn insert_empty<'e, E>(
    executor: E,
    user_id: UserId,
    subject_id: SubjectId,
    at: DateTime<Utc>,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r"
        INSERT INTO mastery_metrics (user_id, subject_id, study_minutes, accuracy, streak_days, last_activity, updated_at)
        VALUES (?1, ?2, 0, 0, 0, NULL, ?3)
        ON CONFLICT(user_id, subject_id) DO NOTHING
        ",
    )
    .bind(to_i64("user_id", user_id.value())?)
    .bind(to_i64("subject_id", subject_id.value())?)
    .bind(at)
    .execute(executor)
    .await
    .map_err(conn_err)?;
    Ok(())
}

/// Fold one session into the pair's metric inside an open transaction.
///
/// The insert runs before the read so the transaction holds the write lock
/// for the whole read-modify-write.
pub(crate) async fn fold_in_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    subject_id: SubjectId,
    fold: MasteryFold,
) -> Result<MasteryMetric, StorageError> {
    insert_empty(&mut *conn, user_id, subject_id, fold.at).await?;

    let mut metric = fetch_metric(&mut *conn, user_id, subject_id)
        .await?
        .ok_or_else(|| StorageError::Invalid("metric vanished during fold".into()))?;
    metric
        .record_session(fold.minutes, fold.accuracy, fold.today, fold.at)
        .map_err(|e| StorageError::Invalid(e.to_string()))?;

    sqlx::query(
        r"
        UPDATE mastery_metrics
        SET study_minutes = ?3,
            accuracy = ?4,
            streak_days = ?5,
            last_activity = ?6,
            updated_at = ?7
        WHERE user_id = ?1 AND subject_id = ?2
        ",
    )
    .bind(to_i64("user_id", user_id.value())?)
    .bind(to_i64("subject_id", subject_id.value())?)
    .bind(i64::from(metric.study_minutes()))
    .bind(metric.accuracy())
    .bind(i64::from(metric.streak_days()))
    .bind(metric.last_activity())
    .bind(metric.updated_at())
    .execute(&mut *conn)
    .await
    .map_err(conn_err)?;

    Ok(metric)
}

#[async_trait::async_trait]
impl MasteryRepository for SqliteRepository {
    async fn get_metric(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<MasteryMetric>, StorageError> {
        fetch_metric(&self.pool, user_id, subject_id).await
    }

    async fn metrics_for_user(&self, user_id: UserId) -> Result<Vec<MasteryMetric>, StorageError> {
        let sql = format!(
            "SELECT {METRIC_COLUMNS} FROM mastery_metrics WHERE user_id = ?1 ORDER BY subject_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(to_i64("user_id", user_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn_err)?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in rows {
            metrics.push(map_metric_row(&row)?);
        }
        Ok(metrics)
    }

    async fn get_or_create_metric(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<MasteryMetric, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;
        insert_empty(&mut *tx, user_id, subject_id, at).await?;
        let metric = fetch_metric(&mut *tx, user_id, subject_id)
            .await?
            .ok_or_else(|| StorageError::Invalid("metric vanished after insert".into()))?;
        tx.commit().await.map_err(conn_err)?;
        Ok(metric)
    }

    async fn fold_session(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        fold: MasteryFold,
    ) -> Result<MasteryMetric, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;
        let metric = fold_in_tx(&mut *tx, user_id, subject_id, fold).await?;
        tx.commit().await.map_err(conn_err)?;
        tracing::debug!(
            user_id = user_id.value(),
            subject_id = subject_id.value(),
            accuracy = metric.accuracy(),
            "mastery metric folded"
        );
        Ok(metric)
    }
}
