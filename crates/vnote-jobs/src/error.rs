//! Job service error types.

use thiserror::Error;

pub type JobsResult<T> = Result<T, JobsError>;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] vnote_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] vnote_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] vnote_queue::QueueError),
}

impl JobsError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, JobsError::NotFound(_))
    }
}

impl From<validator::ValidationErrors> for JobsError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
