//! Job store metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total store operations by operation and outcome.
    pub const OPERATIONS_TOTAL: &str = "job_store_operations_total";

    /// Commits rejected by the version guard.
    pub const CONFLICTS_TOTAL: &str = "job_store_conflicts_total";

    /// Operation latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "job_store_latency_seconds";
}

/// Record metrics for a completed store operation.
pub fn record_operation(operation: &'static str, ok: bool, latency_ms: f64) {
    counter!(
        names::OPERATIONS_TOTAL,
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation).record(latency_ms / 1000.0);
}

/// Record a commit rejected because the record moved on.
pub fn record_conflict() {
    counter!(names::CONFLICTS_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::OPERATIONS_TOTAL.starts_with("job_store_"));
        assert!(names::CONFLICTS_TOTAL.contains("conflicts"));
        assert!(names::LATENCY_SECONDS.ends_with("_seconds"));
    }
}
