//! Durable job store for video summary jobs.
//!
//! This crate provides:
//! - The [`JobStore`] trait: load by id plus per-stage update-and-commit
//! - A Postgres implementation (sqlx) with optimistic concurrency
//! - An in-memory implementation for tests and local development
//! - Connection pool configuration from the environment

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod postgres;


use async_trait::async_trait;
use vnote_models::{JobId, JobUpdate, VideoJob};

pub use config::DbConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// Persistence for [`VideoJob`] records.
///
/// Every write is guarded by the record's `version`: a commit only applies
/// if nobody else has written the record since it was loaded. A lost race
/// surfaces as [`StoreError::Conflict`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job.
    async fn create(&self, job: &VideoJob) -> StoreResult<()>;

    /// Load a job by id. `Ok(None)` if it does not exist.
    async fn load(&self, id: &JobId) -> StoreResult<Option<VideoJob>>;

    /// Apply `update` to the stored record and refresh `job` with the result.
    ///
    /// `job.version` must match the stored version.
    async fn commit(&self, job: &mut VideoJob, update: JobUpdate) -> StoreResult<()>;

    /// Put a job back to `queued` with its error cleared, ahead of a rerun.
    ///
    /// Bumps the version unconditionally, so any run still holding the old
    /// version loses its next commit.
    async fn reset_for_regeneration(&self, id: &JobId) -> StoreResult<VideoJob>;

    /// Delete a job. Returns `false` if it did not exist.
    async fn delete(&self, id: &JobId) -> StoreResult<bool>;

    /// All jobs of an owner, newest first.
    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<VideoJob>>;
}
