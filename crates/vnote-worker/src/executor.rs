//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vnote_queue::{JobQueue, SummarizeVideoJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics::{record_disposition, record_run, set_jobs_in_flight};
use crate::pipeline::{Pipeline, RunOutcome};
use crate::retry::FailureTracker;

/// What to do with a queue message once its run has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Leave the message pending so it is redelivered.
    Retry,
    DeadLetter,
}

/// Decide a message's fate from its run result.
///
/// `attempts` is consulted only for retryable failures.
pub fn disposition(result: &WorkerResult<RunOutcome>, attempts: u32, max_retries: u32) -> Disposition {
    match result {
        Ok(_) => Disposition::Ack,
        Err(e) if e.is_superseded() => Disposition::Ack,
        Err(e) if e.is_retryable() && attempts < max_retries => Disposition::Retry,
        Err(_) => Disposition::DeadLetter,
    }
}

fn outcome_label(result: &WorkerResult<RunOutcome>) -> &'static str {
    match result {
        Ok(RunOutcome::Completed) => "done",
        Ok(RunOutcome::JobMissing) => "missing",
        Err(WorkerError::Superseded(_)) => "superseded",
        Err(WorkerError::TimedOut(_)) => "timed_out",
        Err(_) => "failed",
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    pipeline: Arc<Pipeline>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, pipeline: Pipeline) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            pipeline: Arc::new(pipeline),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Handle used to request a graceful shutdown.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Consume jobs until shutdown is requested, then drain in-flight runs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.job_semaphore),
            self.config.clone(),
            self.consumer_name.clone(),
            self.shutdown.subscribe(),
        ));

        let mut failures = FailureTracker::new(5);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Error consuming jobs: {}", e);
                            }
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout reached with {} jobs still running",
                self.in_flight()
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.config.max_concurrent_jobs - self.job_semaphore.available_permits()
    }

    async fn claim_loop(
        queue: Arc<JobQueue>,
        pipeline: Arc<Pipeline>,
        semaphore: Arc<Semaphore>,
        config: WorkerConfig,
        consumer_name: String,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(config.claim_interval);
        let mut failures = FailureTracker::new(3);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let available = semaphore.available_permits();
                    if available == 0 {
                        continue;
                    }
                    match queue.claim_pending(&consumer_name, config.claim_min_idle, available).await {
                        Ok(jobs) => {
                            failures.record_success();
                            if !jobs.is_empty() {
                                info!("Claimed {} pending jobs", jobs.len());
                            }
                            for (message_id, job) in jobs {
                                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                    break;
                                };
                                let queue = Arc::clone(&queue);
                                let pipeline = Arc::clone(&pipeline);
                                let semaphore = Arc::clone(&semaphore);
                                let pool_size = config.max_concurrent_jobs;
                                tokio::spawn(async move {
                                    set_jobs_in_flight(pool_size - semaphore.available_permits());
                                    Self::execute_job(pipeline, queue, message_id, job).await;
                                    drop(permit);
                                });
                            }
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                warn!("Failed to claim pending jobs: {}", e);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available)
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let pipeline = Arc::clone(&self.pipeline);
            let queue = Arc::clone(&self.queue);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("job semaphore closed"))?;
            set_jobs_in_flight(self.in_flight());

            tokio::spawn(async move {
                Self::execute_job(pipeline, queue, message_id, job).await;
                drop(permit);
            });
        }

        Ok(())
    }

    /// Run one message under its maximum duration, then ack, retry or dead-letter it.
    async fn execute_job(
        pipeline: Arc<Pipeline>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: SummarizeVideoJob,
    ) {
        let job_id = job.job_id.clone();
        let max_duration = job.max_duration();
        info!(job_id = %job_id, message_id = %message_id, "Executing job");

        let started = Instant::now();
        let result = match tokio::time::timeout(max_duration, pipeline.run(&job_id)).await {
            Ok(result) => result,
            Err(_) => {
                let err = WorkerError::TimedOut(max_duration);
                if let Err(e) = pipeline.fail_abandoned(&job_id, &err.to_string()).await {
                    error!(job_id = %job_id, "Failed to mark timed out job as failed: {}", e);
                }
                Err(err)
            }
        };
        record_run(outcome_label(&result), started.elapsed());

        let attempts = match &result {
            Err(e) if e.is_retryable() => queue.increment_retry(&message_id).await.unwrap_or(u32::MAX),
            _ => 0,
        };

        match disposition(&result, attempts, queue.max_retries()) {
            Disposition::Ack => {
                record_disposition("ack");
                if let Err(e) = queue.ack(&message_id).await {
                    error!(job_id = %job_id, "Failed to ack job: {}", e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!(job_id = %job_id, "Failed to clear dedup key: {}", e);
                }
            }
            Disposition::Retry => {
                record_disposition("retry");
                info!(
                    job_id = %job_id,
                    "Job will be retried (attempt {}/{})",
                    attempts,
                    queue.max_retries()
                );
            }
            Disposition::DeadLetter => {
                record_disposition("dlq");
                let reason = result
                    .as_ref()
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                if let Err(e) = queue.dlq(&message_id, &job, &reason).await {
                    error!(job_id = %job_id, "Failed to move job to DLQ: {}", e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!(job_id = %job_id, "Failed to clear dedup key: {}", e);
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
