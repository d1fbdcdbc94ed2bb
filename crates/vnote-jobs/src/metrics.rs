//! Job lifecycle metrics.

use metrics::counter;

pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "vnote_jobs_submitted_total";
    pub const JOBS_REGENERATED_TOTAL: &str = "vnote_jobs_regenerated_total";
    pub const JOBS_DELETED_TOTAL: &str = "vnote_jobs_deleted_total";
    pub const DISPATCH_FAILURES_TOTAL: &str = "vnote_jobs_dispatch_failures_total";
    pub const OBJECT_DELETE_FAILURES_TOTAL: &str = "vnote_jobs_object_delete_failures_total";
    pub const SIGNED_URL_FAILURES_TOTAL: &str = "vnote_jobs_signed_url_failures_total";
}

pub fn record_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_regenerated() {
    counter!(names::JOBS_REGENERATED_TOTAL).increment(1);
}

pub fn record_deleted() {
    counter!(names::JOBS_DELETED_TOTAL).increment(1);
}

/// `action` is `submit` or `regenerate`.
pub fn record_dispatch_failure(action: &'static str) {
    counter!(names::DISPATCH_FAILURES_TOTAL, "action" => action).increment(1);
}

pub fn record_object_delete_failure() {
    counter!(names::OBJECT_DELETE_FAILURES_TOTAL).increment(1);
}

pub fn record_signed_url_failure() {
    counter!(names::SIGNED_URL_FAILURES_TOTAL).increment(1);
}
