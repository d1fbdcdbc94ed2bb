//! Redis Streams dispatch queue.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with per-job deduplication
//! - Consumer-group consumption, ack, and dead-lettering
//! - Reclaiming of messages left pending by crashed workers
//! - Per-message retry counters

pub mod error;
pub mod job;
pub mod queue;

use async_trait::async_trait;

pub use error::{QueueError, QueueResult};
pub use job::{SummarizeVideoJob, DEFAULT_MAX_DURATION_SECS};
pub use queue::{JobQueue, QueueConfig};

/// Something that can hand a job to the worker pool.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Enqueue a job. Returns the queue's message id.
    async fn dispatch(&self, job: SummarizeVideoJob) -> QueueResult<String>;

    /// Enqueue a job even if an earlier message for the same record is
    /// still outstanding.
    async fn redispatch(&self, job: SummarizeVideoJob) -> QueueResult<String> {
        self.dispatch(job).await
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch(&self, job: SummarizeVideoJob) -> QueueResult<String> {
        self.enqueue(&job).await
    }

    async fn redispatch(&self, job: SummarizeVideoJob) -> QueueResult<String> {
        self.clear_dedup(&job).await?;
        self.enqueue(&job).await
    }
}
