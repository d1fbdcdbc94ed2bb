//! Video job service: the actions the upload path takes on a job record.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use validator::Validate;
use vnote_models::{JobId, JobUpdate, NewVideoJob, VideoJob, VideoJobView};
use vnote_queue::{JobDispatcher, QueueError, SummarizeVideoJob};
use vnote_storage::ObjectStore;
use vnote_store::JobStore;

use crate::config::JobsConfig;
use crate::error::{JobsError, JobsResult};
use crate::metrics;

/// Creates, re-runs, deletes and presents jobs on behalf of their owner.
///
/// Every action is owner-scoped: a job owned by someone else is reported as
/// not found.
pub struct VideoJobService {
    store: Arc<dyn JobStore>,
    storage: Arc<dyn ObjectStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    config: JobsConfig,
}

impl VideoJobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        storage: Arc<dyn ObjectStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: JobsConfig,
    ) -> Self {
        Self {
            store,
            storage,
            dispatcher,
            config,
        }
    }

    /// Create a `queued` job for an uploaded video and hand it to the workers.
    ///
    /// If dispatch fails the record is marked `failed` so it does not sit in
    /// `queued` forever.
    pub async fn submit(&self, input: NewVideoJob) -> JobsResult<VideoJob> {
        input.validate()?;

        let mut job = VideoJob::new(input);
        self.store.create(&job).await?;
        info!(job_id = %job.id, owner_id = %job.owner_id, "Created video job");

        let message = SummarizeVideoJob::new(job.id.clone()).with_max_duration(self.config.max_duration);
        let dispatched = self.dispatcher.dispatch(message).await;
        self.settle_dispatch(&mut job, dispatched, "submit").await?;

        metrics::record_submitted();
        Ok(job)
    }

    /// Put a job back to `queued` and run the pipeline again.
    ///
    /// The stored transcript is kept, so the rerun only repeats
    /// summarization. A run still in flight loses its next commit.
    pub async fn regenerate(&self, job_id: &JobId, owner_id: &str) -> JobsResult<VideoJob> {
        self.owned(job_id, owner_id).await?;

        let mut job = self.store.reset_for_regeneration(job_id).await?;
        info!(job_id = %job_id, "Reset video job for regeneration");

        let message = SummarizeVideoJob::new(job.id.clone()).with_max_duration(self.config.max_duration);
        let dispatched = self.dispatcher.redispatch(message).await;
        self.settle_dispatch(&mut job, dispatched, "regenerate").await?;

        metrics::record_regenerated();
        Ok(job)
    }

    /// Delete a job and the video and audio objects it references.
    ///
    /// Object deletion is best-effort; the record is removed regardless.
    pub async fn delete(&self, job_id: &JobId, owner_id: &str) -> JobsResult<()> {
        let job = self.owned(job_id, owner_id).await?;

        let keys = std::iter::once(job.source_reference.as_str()).chain(job.audio_reference.as_deref());
        for key in keys {
            if let Err(e) = self.storage.delete_object(key).await {
                metrics::record_object_delete_failure();
                warn!(job_id = %job_id, key = %key, "Failed to delete object: {}", e);
            }
        }

        if !self.store.delete(job_id).await? {
            debug!(job_id = %job_id, "Job already deleted");
        }
        metrics::record_deleted();
        info!(job_id = %job_id, "Deleted video job");
        Ok(())
    }

    /// One job as shown to its owner.
    pub async fn view(&self, job_id: &JobId, owner_id: &str) -> JobsResult<VideoJobView> {
        let job = self.owned(job_id, owner_id).await?;
        Ok(self.project(job).await)
    }

    /// All of an owner's jobs, newest first.
    pub async fn list(&self, owner_id: &str) -> JobsResult<Vec<VideoJobView>> {
        let jobs = self.store.list_by_owner(owner_id).await?;
        let mut views = Vec::with_capacity(jobs.len());
        for job in jobs {
            views.push(self.project(job).await);
        }
        Ok(views)
    }

    async fn owned(&self, job_id: &JobId, owner_id: &str) -> JobsResult<VideoJob> {
        match self.store.load(job_id).await? {
            Some(job) if job.owner_id == owner_id => Ok(job),
            _ => Err(JobsError::not_found("Job not found")),
        }
    }

    async fn project(&self, job: VideoJob) -> VideoJobView {
        let signed_url = match self
            .storage
            .presign_get(&job.source_reference, self.config.view_url_ttl)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                metrics::record_signed_url_failure();
                warn!(job_id = %job.id, "Failed to sign playback URL: {}", e);
                None
            }
        };
        VideoJobView::from_job(job, signed_url)
    }

    async fn settle_dispatch(
        &self,
        job: &mut VideoJob,
        dispatched: Result<String, QueueError>,
        action: &'static str,
    ) -> JobsResult<()> {
        match dispatched {
            Ok(message_id) => {
                debug!(job_id = %job.id, message_id = %message_id, "Dispatched video job");
                Ok(())
            }
            Err(e) if e.is_duplicate() => {
                debug!(job_id = %job.id, "Video job already queued");
                Ok(())
            }
            Err(e) => {
                metrics::record_dispatch_failure(action);
                error!(job_id = %job.id, "Failed to dispatch video job: {}", e);
                let update = JobUpdate::failed(format!("Failed to dispatch job: {}", e));
                if let Err(commit_err) = self.store.commit(job, update).await {
                    error!(job_id = %job.id, "Failed to mark undispatched job as failed: {}", commit_err);
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use vnote_models::JobStatus;
    use vnote_queue::QueueResult;
    use vnote_storage::LocalObjectStore;
    use vnote_store::MemoryJobStore;

    #[derive(Default)]
    struct FakeDispatcher {
        sent: Mutex<Vec<(&'static str, SummarizeVideoJob)>>,
        fail: bool,
        duplicate: bool,
    }

    impl FakeDispatcher {
        fn sent(&self) -> Vec<(&'static str, SummarizeVideoJob)> {
            self.sent.lock().unwrap().clone()
        }

        fn outcome(&self, kind: &'static str, job: SummarizeVideoJob) -> QueueResult<String> {
            if self.fail {
                return Err(QueueError::connection_failed("redis down"));
            }
            if self.duplicate {
                return Err(QueueError::Duplicate(job.idempotency_key()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((kind, job));
            Ok(format!("{}-0", sent.len()))
        }
    }

    #[async_trait]
    impl JobDispatcher for FakeDispatcher {
        async fn dispatch(&self, job: SummarizeVideoJob) -> QueueResult<String> {
            self.outcome("dispatch", job)
        }

        async fn redispatch(&self, job: SummarizeVideoJob) -> QueueResult<String> {
            self.outcome("redispatch", job)
        }
    }

    struct Harness {
        _root: TempDir,
        storage: LocalObjectStore,
        store: MemoryJobStore,
        dispatcher: Arc<FakeDispatcher>,
        service: VideoJobService,
    }

    fn harness_with(dispatcher: FakeDispatcher) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalObjectStore::new(root.path());
        let store = MemoryJobStore::new();
        let dispatcher = Arc::new(dispatcher);
        let service = VideoJobService::new(
            Arc::new(store.clone()),
            Arc::new(storage.clone()),
            dispatcher.clone(),
            JobsConfig::default(),
        );
        Harness {
            _root: root,
            storage,
            store,
            dispatcher,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeDispatcher::default())
    }

    fn upload(owner: &str) -> NewVideoJob {
        NewVideoJob {
            owner_id: owner.to_string(),
            filename: "lecture.mp4".to_string(),
            source_reference: "videos/abc.mp4".to_string(),
        }
    }

    async fn put_object(storage: &LocalObjectStore, key: &str) {
        let path = storage.path_for(key).unwrap();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"bytes").await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_creates_queued_job_and_dispatches() {
        let h = harness();
        let job = h.service.submit(upload("user-1")).await.unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        let stored = h.store.load(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.source_reference, "videos/abc.mp4");

        let sent = h.dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "dispatch");
        assert_eq!(sent[0].1.job_id, job.id);
        assert_eq!(sent[0].1.max_duration_secs, 3600);
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_input() {
        let h = harness();
        let mut input = upload("user-1");
        input.filename = String::new();

        let err = h.service.submit(input).await.unwrap_err();
        assert!(matches!(err, JobsError::Validation(_)));
        assert!(h.store.is_empty().await);
        assert!(h.dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_submit_dispatch_failure_marks_job_failed() {
        let h = harness_with(FakeDispatcher {
            fail: true,
            ..Default::default()
        });

        let err = h.service.submit(upload("user-1")).await.unwrap_err();
        assert!(matches!(err, JobsError::Queue(_)));

        let jobs = h.store.list_by_owner("user-1").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0].error.as_deref().unwrap().contains("redis down"));
    }

    #[tokio::test]
    async fn test_duplicate_dispatch_is_not_an_error() {
        let h = harness_with(FakeDispatcher {
            duplicate: true,
            ..Default::default()
        });
        let job = h.service.submit(upload("user-1")).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_regenerate_resets_and_redispatches() {
        let h = harness();
        let job = h.service.submit(upload("user-1")).await.unwrap();

        let mut stored = h.store.load(&job.id).await.unwrap().unwrap();
        h.store
            .commit(&mut stored, JobUpdate::transcribed("hello"))
            .await
            .unwrap();
        h.store
            .commit(&mut stored, JobUpdate::failed("quota exceeded"))
            .await
            .unwrap();

        let reset = h.service.regenerate(&job.id, "user-1").await.unwrap();
        assert_eq!(reset.status, JobStatus::Queued);
        assert_eq!(reset.error, None);
        assert_eq!(reset.transcript.as_deref(), Some("hello"));
        assert!(reset.version > stored.version);

        let sent = h.dispatcher.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "redispatch");
        assert_eq!(sent[1].1.job_id, job.id);
    }

    #[tokio::test]
    async fn test_other_owners_see_not_found() {
        let h = harness();
        let job = h.service.submit(upload("user-1")).await.unwrap();

        assert!(h.service.view(&job.id, "user-2").await.unwrap_err().is_not_found());
        assert!(h
            .service
            .regenerate(&job.id, "user-2")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(h.service.delete(&job.id, "user-2").await.unwrap_err().is_not_found());
        assert!(h.store.load(&job.id).await.unwrap().is_some());

        let missing = JobId::from_string("missing");
        assert!(h.service.view(&missing, "user-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_objects_and_record() {
        let h = harness();
        put_object(&h.storage, "videos/abc.mp4").await;
        put_object(&h.storage, "audio/abc.wav").await;

        let job = h.service.submit(upload("user-1")).await.unwrap();
        let mut stored = h.store.load(&job.id).await.unwrap().unwrap();
        h.store
            .commit(&mut stored, JobUpdate::audio_staged("audio/abc.wav"))
            .await
            .unwrap();

        h.service.delete(&job.id, "user-1").await.unwrap();

        assert!(h.store.load(&job.id).await.unwrap().is_none());
        assert!(!h.storage.exists("videos/abc.mp4").await.unwrap());
        assert!(!h.storage.exists("audio/abc.wav").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_objects() {
        let h = harness();
        let mut input = upload("user-1");
        input.source_reference = "../outside.mp4".to_string();
        let job = h.service.submit(input).await.unwrap();

        h.service.delete(&job.id, "user-1").await.unwrap();
        assert!(h.store.load(&job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_view_and_list_carry_signed_urls() {
        let h = harness();
        let first = h.service.submit(upload("user-1")).await.unwrap();
        let mut unsignable = upload("user-1");
        unsignable.source_reference = "../outside.mp4".to_string();
        let second = h.service.submit(unsignable).await.unwrap();
        h.service.submit(upload("user-2")).await.unwrap();

        let view = h.service.view(&first.id, "user-1").await.unwrap();
        assert!(view.signed_url.as_deref().unwrap().contains("videos/abc.mp4"));

        let views = h.service.list("user-1").await.unwrap();
        assert_eq!(views.len(), 2);
        let broken = views.iter().find(|v| v.id == second.id).unwrap();
        assert_eq!(broken.signed_url, None);

        let stored = h.store.load(&second.id).await.unwrap().unwrap();
        assert_eq!(stored, second);
    }
}
