//! Shared error types for the services crate.

use serde::Serialize;
use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use study_core::{Conflict, NotFound, ValidationError};

/// Coarse error category for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
}

/// Errors emitted by the training and metrics services.
///
/// Every variant except `Storage` guarantees nothing was written.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrainingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Conflict(#[from] Conflict),
    #[error(transparent)]
    Storage(StorageError),
}

impl TrainingError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrainingError::Validation(_) => ErrorKind::Validation,
            TrainingError::NotFound(_) => ErrorKind::NotFound,
            TrainingError::Conflict(_) => ErrorKind::Conflict,
            TrainingError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StorageError> for TrainingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(not_found) => TrainingError::NotFound(not_found),
            StorageError::Conflict(conflict) => TrainingError::Conflict(conflict),
            other => TrainingError::Storage(other),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
