//! In-memory job store.
//!
//! Same versioning rules as the Postgres store. Commit failures can be
//! injected per target status to exercise error paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vnote_models::{JobId, JobStatus, JobUpdate, VideoJob};

use crate::error::{StoreError, StoreResult};
use crate::metrics::record_conflict;
use crate::JobStore;

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, VideoJob>,
    failing_statuses: HashSet<JobStatus>,
    commit_log: Vec<(JobId, JobStatus)>,
}

/// Job store held in process memory.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every commit that targets `status` fail with
    /// [`StoreError::Unavailable`].
    pub async fn fail_commits_to(&self, status: JobStatus) {
        self.inner.write().await.failing_statuses.insert(status);
    }

    /// Statuses committed for `id`, in order.
    pub async fn committed_statuses(&self, id: &JobId) -> Vec<JobStatus> {
        self.inner
            .read()
            .await
            .commit_log
            .iter()
            .filter(|(job_id, _)| job_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &VideoJob) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load(&self, id: &JobId) -> StoreResult<Option<VideoJob>> {
        Ok(self.inner.read().await.jobs.get(id).cloned())
    }

    async fn commit(&self, job: &mut VideoJob, update: JobUpdate) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.failing_statuses.contains(&update.status) {
            return Err(StoreError::unavailable(format!(
                "injected failure committing {}",
                update.status
            )));
        }

        let stored = inner
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::NotFound(job.id.clone()))?;
        if stored.version != job.version {
            record_conflict();
            return Err(StoreError::Conflict {
                job_id: job.id.clone(),
                expected_version: job.version,
            });
        }

        stored.apply(&update);
        *job = stored.clone();
        inner.commit_log.push((job.id.clone(), update.status));
        Ok(())
    }

    async fn reset_for_regeneration(&self, id: &JobId) -> StoreResult<VideoJob> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        stored.reset_for_regeneration();
        Ok(stored.clone())
    }

    async fn delete(&self, id: &JobId) -> StoreResult<bool> {
        Ok(self.inner.write().await.jobs.remove(id).is_some())
    }

    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<VideoJob>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<VideoJob> = inner
            .jobs
            .values()
            .filter(|job| job.owner_id == owner_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}
