//! Transcribe-and-summarize pipeline for a single job record.
//!
//! A run walks the job through
//! `queued → processing → transcribing → transcribed → summarizing → done`,
//! committing the record after every stage so a crashed or redelivered run
//! resumes from durable state:
//!
//! 1. fetch the source video (skipped with the next two when a transcript exists)
//! 2. extract and stage the audio track, or reuse previously staged audio
//! 3. transcribe
//! 4. make sure the video is local, then register it as multimodal context
//!    (registration failure only costs the visual context)
//! 5. summarize
//!
//! Any other failure marks the job `failed` with the error text before it is
//! returned. Scratch resources are released on every exit path.

mod scratch;
#[cfg(test)]
mod tests;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use vnote_models::{JobId, JobStatus, JobUpdate, VideoJob};
use vnote_speech::Transcriber;
use vnote_store::JobStore;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::{record_context_skipped, record_stage};
use crate::providers::{ContextProvider, MediaRetrieval, Summarizer};

pub use scratch::{CleanupReport, Scratch, StepOutcome};

const OPERATION: &str = "summarize_video";

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The job record no longer exists; nothing was done.
    JobMissing,
}

/// Everything a run needs, constructed once per worker process.
pub struct Pipeline {
    store: Arc<dyn JobStore>,
    media: Arc<dyn MediaRetrieval>,
    transcriber: Arc<dyn Transcriber>,
    context: Arc<dyn ContextProvider>,
    summarizer: Arc<dyn Summarizer>,
    work_dir: PathBuf,
}

/// Run-local view of the record being driven.
struct RunState {
    job: VideoJob,
    /// Last status committed by this run. `None` until the first commit.
    last_status: Option<JobStatus>,
    logger: JobLogger,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        media: Arc<dyn MediaRetrieval>,
        transcriber: Arc<dyn Transcriber>,
        context: Arc<dyn ContextProvider>,
        summarizer: Arc<dyn Summarizer>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            media,
            transcriber,
            context,
            summarizer,
            work_dir: work_dir.into(),
        }
    }

    /// Run the pipeline for `job_id`, logging the cleanup report.
    pub async fn run(&self, job_id: &JobId) -> WorkerResult<RunOutcome> {
        let logger = JobLogger::new(job_id, OPERATION);
        let span = logger.create_span();
        async {
            let (result, report) = self.run_with_report(job_id).await;
            if report.has_failures() {
                logger.log_warning(&format!(
                    "cleanup incomplete: context {}, video {}, audio {}",
                    report.context, report.video, report.audio
                ));
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run the pipeline and return the cleanup report alongside the result.
    pub async fn run_with_report(
        &self,
        job_id: &JobId,
    ) -> (WorkerResult<RunOutcome>, CleanupReport) {
        let logger = JobLogger::new(job_id, OPERATION);

        let job = match self.store.load(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                logger.log_warning("job record not found, nothing to do");
                return (Ok(RunOutcome::JobMissing), CleanupReport::default());
            }
            Err(e) => return (Err(e.into()), CleanupReport::default()),
        };

        logger.log_start(&format!("status {}, version {}", job.status, job.version));
        if let Err(e) = tokio::fs::create_dir_all(&self.work_dir).await {
            return (Err(e.into()), CleanupReport::default());
        }

        let mut scratch = Scratch::new(&self.work_dir, &job.source_reference);
        let mut state = RunState {
            job,
            last_status: None,
            logger,
        };

        let result = match self.stages(&mut state, &mut scratch).await {
            Ok(()) => {
                state.logger.log_completion("summary stored");
                Ok(RunOutcome::Completed)
            }
            Err(e) if e.is_superseded() => {
                state
                    .logger
                    .log_warning("record changed under this run, stopping without writing");
                Err(e)
            }
            Err(e) => {
                self.record_failure(&mut state, &e).await;
                Err(e)
            }
        };

        let report = scratch.release(self.context.as_ref()).await;
        (result, report)
    }

    /// Mark a job `failed` after its run was abandoned (e.g. timed out).
    ///
    /// Loads the record fresh; terminal records are left alone.
    pub async fn fail_abandoned(&self, job_id: &JobId, reason: &str) -> WorkerResult<()> {
        let Some(mut job) = self.store.load(job_id).await? else {
            return Ok(());
        };
        if job.status.is_terminal() {
            return Ok(());
        }
        self.store
            .commit(&mut job, JobUpdate::failed(reason))
            .await?;
        JobLogger::new(job_id, OPERATION).log_status(job.status, job.version);
        Ok(())
    }

    async fn stages(&self, state: &mut RunState, scratch: &mut Scratch) -> WorkerResult<()> {
        if state.job.has_transcript() {
            state
                .logger
                .log_progress("transcript already stored, skipping transcription");
        } else {
            // Stage 1: acquire source
            self.commit(state, JobUpdate::status(JobStatus::Processing))
                .await?;
            timed(
                "fetch_video",
                self.media
                    .fetch(&state.job.source_reference, scratch.video_path()),
            )
            .await?;

            // Stage 2: extract and stage audio
            match state.job.audio_reference.clone() {
                Some(reference) => {
                    state.logger.log_progress("reusing staged audio");
                    timed(
                        "fetch_audio",
                        self.media.fetch_audio(&reference, scratch.audio_path()),
                    )
                    .await?;
                    self.commit(state, JobUpdate::status(JobStatus::Transcribing))
                        .await?;
                }
                None => {
                    timed(
                        "extract_audio",
                        self.media
                            .extract_audio(scratch.video_path(), scratch.audio_path()),
                    )
                    .await?;
                    let reference =
                        timed("store_audio", self.media.store_audio(scratch.audio_path()))
                            .await?;
                    self.commit(state, JobUpdate::audio_staged(reference)).await?;
                }
            }

            // Stage 3: transcribe
            let started = Instant::now();
            let transcript = self.transcriber.transcribe(scratch.audio_path()).await?;
            record_stage("transcribe", started.elapsed());
            state.logger.log_progress(&format!(
                "transcribed {} chars with {}",
                transcript.len(),
                self.transcriber.name()
            ));
            self.commit(state, JobUpdate::transcribed(transcript)).await?;
        }

        // Stage 4: multimodal context
        if !scratch.has_video() {
            timed(
                "fetch_video",
                self.media
                    .fetch(&state.job.source_reference, scratch.video_path()),
            )
            .await?;
        }
        self.commit(state, JobUpdate::status(JobStatus::Summarizing))
            .await?;

        let started = Instant::now();
        let context = match self.context.register(scratch.video_path()).await {
            Ok(handle) => {
                scratch.set_context(handle.clone());
                Some(handle)
            }
            Err(e) => {
                record_context_skipped();
                state.logger.log_warning(&format!(
                    "continuing without video context: {}",
                    e
                ));
                None
            }
        };
        record_stage("register_context", started.elapsed());

        // Stage 5: summarize
        let transcript = state.job.transcript.clone().unwrap_or_default();
        let summary = timed(
            "summarize",
            self.summarizer.summarize(&transcript, context.as_ref()),
        )
        .await?;
        self.commit(state, JobUpdate::done(summary)).await
    }

    /// Commit one stage, refusing moves that go backwards within this run.
    async fn commit(&self, state: &mut RunState, update: JobUpdate) -> WorkerResult<()> {
        if let Some(last) = state.last_status {
            if !last.can_transition_to(update.status) {
                return Err(WorkerError::InvalidTransition(format!(
                    "{} -> {}",
                    last, update.status
                )));
            }
        }
        let status = update.status;
        self.store.commit(&mut state.job, update).await?;
        state.last_status = Some(status);
        state.logger.log_status(status, state.job.version);
        Ok(())
    }

    async fn record_failure(&self, state: &mut RunState, err: &WorkerError) {
        state.logger.log_error(&err.to_string());
        let update = JobUpdate::failed(err.to_string());
        match self.store.commit(&mut state.job, update).await {
            Ok(()) => state.logger.log_status(JobStatus::Failed, state.job.version),
            Err(commit_err) => state.logger.log_error(&format!(
                "could not record failure: {}",
                commit_err
            )),
        }
    }
}

/// Await a stage future, recording its duration.
async fn timed<T>(
    stage: &'static str,
    fut: impl Future<Output = WorkerResult<T>>,
) -> WorkerResult<T> {
    let started = Instant::now();
    let result = fut.await;
    record_stage(stage, started.elapsed());
    result
}
