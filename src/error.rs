//! Crate-level error taxonomy.
//!
//! Errors are classified by what the caller can do about them:
//! - `Auth`: credentials are missing or expired — re-authenticate; no
//!   fallback is semantically valid.
//! - `TaskService` / `Ai`: an external collaborator failed. The call sites
//!   that can degrade (analysis, staleness detection, task listing) recover
//!   with their documented fallbacks before one of these ever propagates.
//! - Everything else is local (storage, config, parsing).

use thiserror::Error;

use crate::ai::AiError;
use crate::db::DbError;
use crate::ticktick::TaskServiceError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Re-authentication required: {0}")]
    Auth(String),

    #[error("Task service unavailable: {0}")]
    TaskService(TaskServiceError),

    #[error("AI provider unavailable: {0}")]
    Ai(AiError),

    #[error("Storage error: {0}")]
    Db(#[from] DbError),

    #[error("Email parsing failed: {0}")]
    Email(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True when the only fix is the user re-authenticating.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }
}

impl From<TaskServiceError> for AppError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::Auth(msg) => AppError::Auth(msg),
            other => AppError::TaskService(other),
        }
    }
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::Auth(msg) => AppError::Auth(msg),
            other => AppError::Ai(other),
        }
    }
}
