//! Lifecycle actions on video summary jobs.
//!
//! This crate provides:
//! - Job submission from the upload path, with dispatch to the worker pool
//! - Regeneration of an existing job
//! - Deletion of a job together with its stored objects
//! - Owner-scoped views with signed playback URLs

pub mod config;
pub mod error;
pub mod metrics;
pub mod service;

pub use config::JobsConfig;
pub use error::{JobsError, JobsResult};
pub use service::VideoJobService;
