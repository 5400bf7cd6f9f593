use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the collaborator lookup tables (users, subjects, questions), the
/// training tables (sessions, answers, mastery metrics) and their indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS subjects (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    color TEXT NOT NULL DEFAULT '#0EA5A4',
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    subject_id INTEGER NOT NULL,
                    prompt TEXT NOT NULL,
                    alternatives TEXT NOT NULL,
                    correct_index INTEGER NOT NULL CHECK (correct_index >= 0),
                    explanation TEXT,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS training_sessions (
                    id INTEGER PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    kind TEXT NOT NULL CHECK (kind IN ('questions', 'flashcards', 'mindmaps')),
                    subject_id INTEGER,
                    target_count INTEGER NOT NULL CHECK (target_count >= 0),
                    completed_count INTEGER NOT NULL DEFAULT 0 CHECK (completed_count >= 0),
                    elapsed_seconds INTEGER NOT NULL DEFAULT 0 CHECK (elapsed_seconds >= 0),
                    started_at TEXT NOT NULL,
                    ended_at TEXT,
                    finalized INTEGER NOT NULL DEFAULT 0 CHECK (finalized IN (0, 1)),
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                    FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE SET NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // At most one unfinalized session per user.
        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_training_sessions_one_active
                    ON training_sessions (user_id) WHERE finalized = 0;
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS answers (
                    id INTEGER PRIMARY KEY,
                    session_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    chosen_index INTEGER NOT NULL CHECK (chosen_index >= 0),
                    correct INTEGER NOT NULL CHECK (correct IN (0, 1)),
                    response_seconds INTEGER NOT NULL DEFAULT 0 CHECK (response_seconds >= 0),
                    answered_at TEXT NOT NULL,
                    UNIQUE (session_id, question_id),
                    FOREIGN KEY (session_id) REFERENCES training_sessions(id) ON DELETE CASCADE,
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS mastery_metrics (
                    user_id INTEGER NOT NULL,
                    subject_id INTEGER NOT NULL,
                    study_minutes INTEGER NOT NULL DEFAULT 0 CHECK (study_minutes >= 0),
                    accuracy REAL NOT NULL DEFAULT 0 CHECK (accuracy BETWEEN 0 AND 100),
                    streak_days INTEGER NOT NULL DEFAULT 0 CHECK (streak_days >= 0),
                    last_activity TEXT,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, subject_id),
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                    FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_training_sessions_user_started
                    ON training_sessions (user_id, started_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_training_sessions_user_finalized_ended
                    ON training_sessions (user_id, finalized, ended_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_subject
                    ON questions (subject_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
