//! Worker error types.

use std::time::Duration;

use thiserror::Error;
use vnote_models::JobId;
use vnote_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Another writer moved the job record on; this run no longer owns it.
    #[error("Job {0} was superseded by another run")]
    Superseded(JobId),

    #[error("Context preparation failed: {0}")]
    ContextFailed(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Run exceeded its maximum duration of {0:?}")]
    TimedOut(Duration),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vnote_storage::StorageError),

    #[error("Job store error: {0}")]
    Store(#[source] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] vnote_media::MediaError),

    #[error("Transcription error: {0}")]
    Speech(#[from] vnote_speech::SpeechError),

    #[error("Queue error: {0}")]
    Queue(#[from] vnote_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for WorkerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { job_id, .. } => Self::Superseded(job_id),
            // Deleted under a running job
            StoreError::NotFound(job_id) => Self::Superseded(job_id),
            other => Self::Store(other),
        }
    }
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn context_failed(msg: impl Into<String>) -> Self {
        Self::ContextFailed(msg.into())
    }

    pub fn summarization_failed(msg: impl Into<String>) -> Self {
        Self::SummarizationFailed(msg.into())
    }

    pub fn provider_unavailable(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    /// Map a non-success provider HTTP status. Throttling and server errors
    /// are transient; anything else is reported through `permanent`.
    pub fn from_provider_status(
        status: u16,
        body: &str,
        permanent: fn(String) -> WorkerError,
    ) -> Self {
        let msg = format!("HTTP {}: {}", status, body);
        match status {
            429 | 500..=599 => Self::ProviderUnavailable(msg),
            401 | 403 => Self::ConfigError(format!("credential rejected ({})", msg)),
            _ => permanent(msg),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::ProviderUnavailable(_) | WorkerError::Io(_) => true,
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Speech(e) => e.is_retryable(),
            WorkerError::Queue(_) => true,
            _ => false,
        }
    }

    /// Check if this run lost ownership of the job record.
    pub fn is_superseded(&self) -> bool {
        matches!(self, WorkerError::Superseded(_))
    }
}
