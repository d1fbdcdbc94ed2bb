//! Shared data models for the video notes backend.
//!
//! This crate provides Serde-serializable types for:
//! - Video summary jobs and their pipeline status
//! - Per-stage update payloads committed by the worker
//! - The read-side view returned to clients
//! - Multimodal context handles

pub mod context;
pub mod job;
pub mod job_status;
pub mod view;

// Re-export common types
pub use context::ContextHandle;
pub use job::{JobId, JobUpdate, NewVideoJob, VideoJob, MAX_FILENAME_LEN};
pub use job_status::{JobStatus, ParseJobStatusError};
pub use view::VideoJobView;
