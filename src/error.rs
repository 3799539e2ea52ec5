//! Crate-wide error taxonomy.
//!
//! Five-bucket error taxonomy: input errors, storage errors, oracle errors,
//! schema violations, and concurrency errors. Stage workers catch `EtError`
//! per item and record it rather than unwinding (see `pipeline::RunOutcome`).

use std::path::PathBuf;
use thiserror::Error;

pub type EtResult<T> = Result<T, EtError>;

#[derive(Debug, Error)]
pub enum EtError {
    #[error("input error: {0}")]
    Input(String),

    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("oracle error: {0}")]
    Oracle(#[from] crate::oracle::OracleError),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("lock acquisition timed out after {0:?}")]
    LockTimeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtError {
    /// Whether this error should abort the whole stage under `fail_fast`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EtError::SchemaViolation(_) | EtError::Storage(_) | EtError::Io(_)
        )
    }
}
