use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use vnote_media::MediaError;
use vnote_models::{ContextHandle, JobId, JobStatus, NewVideoJob, VideoJob};
use vnote_speech::{SpeechError, SpeechResult, Transcriber};
use vnote_storage::{audio_key, LocalObjectStore, ObjectStore};
use vnote_store::{JobStore, MemoryJobStore};

use super::*;
use crate::providers::MockContextProvider;

const TRANSCRIPT: &str = "today we cover borrowing and lifetimes in depth";

/// Media retrieval over a local object store, with a fake extractor.
struct FakeMedia {
    storage: LocalObjectStore,
    extractions: AtomicUsize,
    audio_fetches: AtomicUsize,
    fail_extract: AtomicBool,
}

#[async_trait]
impl MediaRetrieval for FakeMedia {
    async fn fetch(&self, source_reference: &str, dest: &Path) -> WorkerResult<()> {
        self.storage.download_file(source_reference, dest).await?;
        Ok(())
    }

    async fn extract_audio(&self, video: &Path, dest: &Path) -> WorkerResult<()> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        if self.fail_extract.load(Ordering::SeqCst) {
            return Err(MediaError::ffmpeg_failed(
                "Invalid data found when processing input",
                None,
                Some(1),
            )
            .into());
        }
        assert!(video.exists(), "video must be fetched before extraction");
        tokio::fs::write(dest, b"RIFF-fake-wav").await?;
        Ok(())
    }

    async fn store_audio(&self, audio: &Path) -> WorkerResult<String> {
        let key = audio_key("wav");
        self.storage.upload_file(audio, &key, "audio/wav").await?;
        Ok(key)
    }

    async fn fetch_audio(&self, audio_reference: &str, dest: &Path) -> WorkerResult<()> {
        self.audio_fetches.fetch_add(1, Ordering::SeqCst);
        self.storage.download_file(audio_reference, dest).await?;
        Ok(())
    }
}

#[derive(Default)]
struct FakeTranscriber {
    calls: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: &Path) -> SpeechResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SpeechError::TranscriptionFailed("decoder crashed".to_string()));
        }
        assert!(audio.exists(), "audio must be local before transcription");
        Ok(TRANSCRIPT.to_string())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
struct FakeContext {
    registered: AtomicUsize,
    released: AtomicUsize,
    fail_release: AtomicBool,
}

#[async_trait]
impl ContextProvider for FakeContext {
    async fn register(&self, video: &Path) -> WorkerResult<ContextHandle> {
        assert!(video.exists(), "video must be local before registration");
        let n = self.registered.fetch_add(1, Ordering::SeqCst);
        Ok(ContextHandle {
            name: format!("files/{}", n),
            uri: format!("https://files.test/{}", n),
            mime_type: "video/mp4".to_string(),
        })
    }

    async fn release(&self, _handle: &ContextHandle) -> WorkerResult<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(WorkerError::context_failed("HTTP 500: internal"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeSummarizer {
    calls: AtomicUsize,
    fail: AtomicBool,
    saw_context: AtomicBool,
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(
        &self,
        transcript: &str,
        context: Option<&ContextHandle>,
    ) -> WorkerResult<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.saw_context.store(context.is_some(), Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(WorkerError::summarization_failed("Gemini returned no text."));
        }
        Ok(format!(
            "**SUMMARY**\nNotes (draft {}) on: {}\n\n**KEY TAKEAWAYS**\n- first point\n- second point\n\n**NEXT STEPS**\n1. Practice",
            n, transcript
        ))
    }
}

struct Harness {
    remote: TempDir,
    work: TempDir,
    store: MemoryJobStore,
    media: Arc<FakeMedia>,
    transcriber: Arc<FakeTranscriber>,
    context: Arc<FakeContext>,
    summarizer: Arc<FakeSummarizer>,
}

impl Harness {
    fn new() -> Self {
        let remote = TempDir::new().unwrap();
        let media = Arc::new(FakeMedia {
            storage: LocalObjectStore::new(remote.path()),
            extractions: AtomicUsize::new(0),
            audio_fetches: AtomicUsize::new(0),
            fail_extract: AtomicBool::new(false),
        });
        Self {
            remote,
            work: TempDir::new().unwrap(),
            store: MemoryJobStore::new(),
            media,
            transcriber: Arc::new(FakeTranscriber::default()),
            context: Arc::new(FakeContext::default()),
            summarizer: Arc::new(FakeSummarizer::default()),
        }
    }

    fn pipeline(&self) -> Pipeline {
        self.pipeline_with(self.transcriber.clone(), self.context.clone())
    }

    fn pipeline_with(
        &self,
        transcriber: Arc<dyn Transcriber>,
        context: Arc<dyn ContextProvider>,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(self.store.clone()),
            self.media.clone(),
            transcriber,
            context,
            self.summarizer.clone(),
            self.work.path().join("scratch"),
        )
    }

    fn storage(&self) -> LocalObjectStore {
        LocalObjectStore::new(self.remote.path())
    }

    async fn put_object(&self, key: &str, body: &[u8]) {
        let path = self.storage().path_for(key).unwrap();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, body).await.unwrap();
    }

    fn new_job(&self, source_reference: &str) -> VideoJob {
        VideoJob::new(NewVideoJob {
            owner_id: "user-1".to_string(),
            filename: "lecture.mp4".to_string(),
            source_reference: source_reference.to_string(),
        })
    }

    async fn submit(&self, job: VideoJob) -> JobId {
        self.store.create(&job).await.unwrap();
        job.id
    }

    async fn uploaded_job(&self) -> JobId {
        self.put_object("videos/abc.mp4", b"fake mp4 bytes").await;
        self.submit(self.new_job("videos/abc.mp4")).await
    }

    async fn job(&self, id: &JobId) -> VideoJob {
        self.store.load(id).await.unwrap().unwrap()
    }

    fn scratch_is_empty(&self) -> bool {
        match std::fs::read_dir(self.work.path().join("scratch")) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}

#[tokio::test]
async fn test_fresh_job_runs_to_done() {
    let h = Harness::new();
    let id = h.uploaded_job().await;

    let (result, report) = h.pipeline().run_with_report(&id).await;
    assert_eq!(result.unwrap(), RunOutcome::Completed);

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.transcript.as_deref(), Some(TRANSCRIPT));
    assert!(job.summary.as_deref().unwrap().contains(TRANSCRIPT));
    assert!(job.error.is_none());

    let audio = job.audio_reference.clone().unwrap();
    assert!(audio.starts_with("audio/"));
    assert!(h.storage().exists(&audio).await.unwrap());

    assert_eq!(
        h.store.committed_statuses(&id).await,
        vec![
            JobStatus::Processing,
            JobStatus::Transcribing,
            JobStatus::Transcribed,
            JobStatus::Summarizing,
            JobStatus::Done,
        ]
    );
    assert!(h.summarizer.saw_context.load(Ordering::SeqCst));
    assert_eq!(report.context, StepOutcome::Done);
    assert_eq!(report.video, StepOutcome::Done);
    assert_eq!(report.audio, StepOutcome::Done);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_stored_transcript_skips_transcription() {
    let h = Harness::new();
    h.put_object("videos/abc.mp4", b"fake mp4 bytes").await;
    let mut job = h.new_job("videos/abc.mp4");
    job.transcript = Some("words from an earlier run".to_string());
    let id = h.submit(job).await;

    h.pipeline().run(&id).await.unwrap();

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.transcript.as_deref(), Some("words from an earlier run"));
    assert!(job.audio_reference.is_none());
    assert_eq!(h.media.extractions.load(Ordering::SeqCst), 0);
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    // the video is downloaded again for context registration
    assert_eq!(h.context.registered.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.store.committed_statuses(&id).await,
        vec![JobStatus::Summarizing, JobStatus::Done]
    );
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_empty_transcript_is_transcribed_again() {
    let h = Harness::new();
    h.put_object("videos/abc.mp4", b"fake mp4 bytes").await;
    let mut job = h.new_job("videos/abc.mp4");
    job.transcript = Some(String::new());
    let id = h.submit(job).await;

    h.pipeline().run(&id).await.unwrap();

    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.transcript.as_deref(), Some(TRANSCRIPT));
    assert!(job.summary.as_deref().unwrap().contains("SUMMARY"));
}

#[tokio::test]
async fn test_staged_audio_is_reused() {
    let h = Harness::new();
    h.put_object("videos/abc.mp4", b"fake mp4 bytes").await;
    h.put_object("audio/staged.wav", b"RIFF-staged").await;
    let mut job = h.new_job("videos/abc.mp4");
    job.status = JobStatus::Transcribing;
    job.audio_reference = Some("audio/staged.wav".to_string());
    let id = h.submit(job).await;

    h.pipeline().run(&id).await.unwrap();

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.audio_reference.as_deref(), Some("audio/staged.wav"));
    assert_eq!(h.media.extractions.load(Ordering::SeqCst), 0);
    assert_eq!(h.media.audio_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_extraction_failure_marks_failed() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    h.media.fail_extract.store(true, Ordering::SeqCst);

    let (result, report) = h.pipeline().run_with_report(&id).await;
    assert!(matches!(result, Err(WorkerError::Media(_))));

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("Invalid data found"));
    assert!(job.summary.is_none());
    assert_eq!(report.video, StepOutcome::Done);
    assert_eq!(report.context, StepOutcome::Skipped);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_transcription_failure_marks_failed() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    h.transcriber.fail.store(true, Ordering::SeqCst);

    let result = h.pipeline().run(&id).await;
    assert!(matches!(result, Err(WorkerError::Speech(_))));

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("decoder crashed"));
    // audio staged before the failure stays referenced for the next run
    assert!(job.audio_reference.is_some());
    assert!(job.transcript.is_none());
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_summarization_failure_marks_failed_and_releases_context() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    h.summarizer.fail.store(true, Ordering::SeqCst);

    let (result, report) = h.pipeline().run_with_report(&id).await;
    assert!(matches!(result, Err(WorkerError::SummarizationFailed(_))));

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.error.as_deref().unwrap().is_empty());
    assert_eq!(job.transcript.as_deref(), Some(TRANSCRIPT));
    assert_eq!(report.context, StepOutcome::Done);
    assert_eq!(h.context.released.load(Ordering::SeqCst), 1);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_missing_source_object_fails_with_not_found() {
    let h = Harness::new();
    let id = h.submit(h.new_job("videos/missing.mp4")).await;

    let result = h.pipeline().run(&id).await;
    assert!(result.is_err());

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().to_lowercase().contains("not found"));
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_redownload_failure_before_summary_is_fatal() {
    let h = Harness::new();
    let mut job = h.new_job("videos/deleted.mp4");
    job.transcript = Some(TRANSCRIPT.to_string());
    let id = h.submit(job).await;

    let result = h.pipeline().run(&id).await;
    assert!(result.is_err());

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 0);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_context_failure_does_not_fail_run() {
    let h = Harness::new();
    let id = h.uploaded_job().await;

    let mut context = MockContextProvider::new();
    context
        .expect_register()
        .times(1)
        .returning(|_| Err(WorkerError::context_failed("Timeout waiting for Gemini file processing.")));
    context.expect_release().never();

    let pipeline = h.pipeline_with(h.transcriber.clone(), Arc::new(context));
    let (result, report) = pipeline.run_with_report(&id).await;
    assert_eq!(result.unwrap(), RunOutcome::Completed);

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.error.is_none());
    assert!(!h.summarizer.saw_context.load(Ordering::SeqCst));
    assert_eq!(report.context, StepOutcome::Skipped);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_cleanup_failure_is_isolated() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    h.context.fail_release.store(true, Ordering::SeqCst);

    let (result, report) = h.pipeline().run_with_report(&id).await;
    assert!(result.is_ok());
    assert!(report.context.is_failed());
    assert_eq!(report.video, StepOutcome::Done);
    assert_eq!(report.audio, StepOutcome::Done);
    assert_eq!(h.job(&id).await.status, JobStatus::Done);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_regeneration_reuses_transcript() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    let pipeline = h.pipeline();

    pipeline.run(&id).await.unwrap();
    let first = h.job(&id).await;

    let reset = h.store.reset_for_regeneration(&id).await.unwrap();
    assert_eq!(reset.status, JobStatus::Queued);
    pipeline.run(&id).await.unwrap();
    let second = h.job(&id).await;

    assert_eq!(second.status, JobStatus::Done);
    assert_eq!(second.transcript, first.transcript);
    assert_eq!(second.audio_reference, first.audio_reference);
    assert_ne!(second.summary, first.summary);
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_job_recovers_on_rerun() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    h.summarizer.fail.store(true, Ordering::SeqCst);
    assert!(h.pipeline().run(&id).await.is_err());

    h.summarizer.fail.store(false, Ordering::SeqCst);
    h.store.reset_for_regeneration(&id).await.unwrap();
    h.pipeline().run(&id).await.unwrap();

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.error.is_none());
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scenario_uploaded_video_gets_notes() {
    let h = Harness::new();
    let id = h.uploaded_job().await;

    h.pipeline().run(&id).await.unwrap();

    let job = h.job(&id).await;
    assert_eq!(job.source_reference, "videos/abc.mp4");
    assert_eq!(job.status, JobStatus::Done);
    let summary = job.summary.unwrap();
    assert!(summary.contains("SUMMARY"));
    assert!(summary.lines().any(|l| l.trim_start().starts_with("- ")));
}

#[tokio::test]
async fn test_missing_job_is_noop() {
    let h = Harness::new();
    let result = h.pipeline().run(&JobId::from_string("nope")).await;
    assert_eq!(result.unwrap(), RunOutcome::JobMissing);
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
}

/// Regenerates the job while its first run is still transcribing.
struct RacingTranscriber {
    store: MemoryJobStore,
    job_id: JobId,
}

#[async_trait]
impl Transcriber for RacingTranscriber {
    async fn transcribe(&self, _audio: &Path) -> SpeechResult<String> {
        self.store
            .reset_for_regeneration(&self.job_id)
            .await
            .map_err(|e| SpeechError::TranscriptionFailed(e.to_string()))?;
        Ok(TRANSCRIPT.to_string())
    }

    fn name(&self) -> &'static str {
        "racing"
    }
}

#[tokio::test]
async fn test_superseded_run_stops_without_writing() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    let racer = Arc::new(RacingTranscriber {
        store: h.store.clone(),
        job_id: id.clone(),
    });

    let result = h.pipeline_with(racer, h.context.clone()).run(&id).await;
    assert!(result.unwrap_err().is_superseded());

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.error.is_none());
    assert!(job.transcript.is_none());
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_failure_commit_error_keeps_original_error() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    h.summarizer.fail.store(true, Ordering::SeqCst);
    h.store.fail_commits_to(JobStatus::Failed).await;

    let result = h.pipeline().run(&id).await;
    assert!(matches!(result, Err(WorkerError::SummarizationFailed(_))));
    assert_eq!(h.job(&id).await.status, JobStatus::Summarizing);
    assert!(h.scratch_is_empty());
}

struct HangingTranscriber;

#[async_trait]
impl Transcriber for HangingTranscriber {
    async fn transcribe(&self, _audio: &Path) -> SpeechResult<String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(String::new())
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

#[tokio::test]
async fn test_abandoned_run_leaves_no_local_files() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    let pipeline = h.pipeline_with(Arc::new(HangingTranscriber), h.context.clone());

    let timed_out = tokio::time::timeout(Duration::from_millis(200), pipeline.run(&id)).await;
    assert!(timed_out.is_err());
    assert!(h.scratch_is_empty());

    pipeline
        .fail_abandoned(&id, "Run exceeded its maximum duration")
        .await
        .unwrap();
    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("maximum duration"));
}

#[tokio::test]
async fn test_fail_abandoned_leaves_terminal_jobs() {
    let h = Harness::new();
    let id = h.uploaded_job().await;
    h.pipeline().run(&id).await.unwrap();

    h.pipeline().fail_abandoned(&id, "late timeout").await.unwrap();
    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.error.is_none());
}
