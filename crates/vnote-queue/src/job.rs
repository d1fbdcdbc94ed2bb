//! Queue message payloads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vnote_models::JobId;

/// Default wall-clock budget for one pipeline run.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 3600;

/// Run the transcribe-and-summarize pipeline for one job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeVideoJob {
    pub job_id: JobId,

    /// Maximum wall-clock time the worker may spend on this run
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,

    pub enqueued_at: DateTime<Utc>,
}

fn default_max_duration() -> u64 {
    DEFAULT_MAX_DURATION_SECS
}

impl SummarizeVideoJob {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration_secs = max_duration.as_secs().max(1);
        self
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs.max(1))
    }

    /// Key used to reject duplicate enqueues of the same record.
    pub fn idempotency_key(&self) -> String {
        format!("summarize:{}", self.job_id)
    }
}
