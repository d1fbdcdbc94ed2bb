//! Prometheus metrics for the worker.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    /// Pipeline runs by outcome (`done`, `failed`, `superseded`, `missing`, `timed_out`).
    pub const RUNS_TOTAL: &str = "vnote_worker_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "vnote_worker_run_duration_seconds";

    /// Time spent per pipeline stage.
    pub const STAGE_DURATION_SECONDS: &str = "vnote_worker_stage_duration_seconds";

    /// Cleanup steps that failed, by step.
    pub const CLEANUP_FAILURES_TOTAL: &str = "vnote_worker_cleanup_failures_total";

    /// Context registrations that failed and were skipped.
    pub const CONTEXT_SKIPPED_TOTAL: &str = "vnote_worker_context_skipped_total";

    /// Queue dispositions (`ack`, `retry`, `dlq`).
    pub const QUEUE_DISPOSITIONS_TOTAL: &str = "vnote_worker_queue_dispositions_total";

    pub const JOBS_IN_FLIGHT: &str = "vnote_worker_jobs_in_flight";
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}

pub fn record_run(outcome: &'static str, elapsed: Duration) {
    counter!(names::RUNS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, "outcome" => outcome).record(elapsed.as_secs_f64());
}

pub fn record_stage(stage: &'static str, elapsed: Duration) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(elapsed.as_secs_f64());
}

pub fn record_cleanup_failure(step: &'static str) {
    counter!(names::CLEANUP_FAILURES_TOTAL, "step" => step).increment(1);
}

pub fn record_context_skipped() {
    counter!(names::CONTEXT_SKIPPED_TOTAL).increment(1);
}

pub fn record_disposition(disposition: &'static str) {
    counter!(names::QUEUE_DISPOSITIONS_TOTAL, "disposition" => disposition).increment(1);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}
