use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use study_core::model::{
    Answer, AnswerId, MasteryMetric, QuestionId, QuestionKey, SessionId, SessionKind, SubjectId,
    TrainingSession, UserId,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Bind-side conversion for ids and counters.
pub(crate) fn to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn answer_id_from_i64(v: i64) -> Result<AnswerId, StorageError> {
    Ok(AnswerId::new(i64_to_u64("answer_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn subject_id_from_i64(v: i64) -> Result<SubjectId, StorageError> {
    Ok(SubjectId::new(i64_to_u64("subject_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) const SESSION_COLUMNS: &str = "id, user_id, kind, subject_id, target_count, \
     completed_count, elapsed_seconds, started_at, ended_at, finalized";

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<TrainingSession, StorageError> {
    let id = session_id_from_i64(row.try_get("id").map_err(ser)?)?;
    let user_id = user_id_from_i64(row.try_get("user_id").map_err(ser)?)?;

    let kind_str: String = row.try_get("kind").map_err(ser)?;
    let kind: SessionKind = kind_str.parse().map_err(ser)?;

    let subject_id = row
        .try_get::<Option<i64>, _>("subject_id")
        .map_err(ser)?
        .map(subject_id_from_i64)
        .transpose()?;

    let target_count = i64_to_u32("target_count", row.try_get("target_count").map_err(ser)?)?;
    let completed_count =
        i64_to_u32("completed_count", row.try_get("completed_count").map_err(ser)?)?;
    let elapsed_seconds =
        i64_to_u64("elapsed_seconds", row.try_get("elapsed_seconds").map_err(ser)?)?;

    let started_at: DateTime<Utc> = row.try_get("started_at").map_err(ser)?;
    let ended_at: Option<DateTime<Utc>> = row.try_get("ended_at").map_err(ser)?;
    let finalized: i64 = row.try_get("finalized").map_err(ser)?;

    TrainingSession::from_persisted(
        id,
        user_id,
        kind,
        subject_id,
        target_count,
        completed_count,
        elapsed_seconds,
        started_at,
        ended_at,
        finalized != 0,
    )
    .map_err(|e| StorageError::Invalid(e.to_string()))
}

pub(crate) fn map_answer_row(row: &SqliteRow) -> Result<Answer, StorageError> {
    let correct: i64 = row.try_get("correct").map_err(ser)?;
    Ok(Answer {
        id: answer_id_from_i64(row.try_get("id").map_err(ser)?)?,
        session_id: session_id_from_i64(row.try_get("session_id").map_err(ser)?)?,
        question_id: question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
        chosen_index: i64_to_u32("chosen_index", row.try_get("chosen_index").map_err(ser)?)?,
        correct: correct != 0,
        response_seconds: i64_to_u32(
            "response_seconds",
            row.try_get("response_seconds").map_err(ser)?,
        )?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
    })
}

pub(crate) fn map_metric_row(row: &SqliteRow) -> Result<MasteryMetric, StorageError> {
    let last_activity: Option<NaiveDate> = row.try_get("last_activity").map_err(ser)?;
    MasteryMetric::from_persisted(
        user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        subject_id_from_i64(row.try_get("subject_id").map_err(ser)?)?,
        i64_to_u32("study_minutes", row.try_get("study_minutes").map_err(ser)?)?,
        row.try_get("accuracy").map_err(ser)?,
        i64_to_u32("streak_days", row.try_get("streak_days").map_err(ser)?)?,
        last_activity,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(|e| StorageError::Invalid(e.to_string()))
}

pub(crate) fn map_question_key_row(row: &SqliteRow) -> Result<QuestionKey, StorageError> {
    Ok(QuestionKey {
        id: question_id_from_i64(row.try_get("id").map_err(ser)?)?,
        correct_index: i64_to_u32("correct_index", row.try_get("correct_index").map_err(ser)?)?,
        option_count: i64_to_u32("option_count", row.try_get("option_count").map_err(ser)?)?,
        explanation: row.try_get("explanation").map_err(ser)?,
    })
}
