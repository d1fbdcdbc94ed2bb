//! Video notes worker.
//!
//! This crate provides:
//! - The transcribe-and-summarize pipeline over a durable job record
//! - Gemini-backed multimodal context and summarization
//! - A queue-driven executor with a fixed-size pool, per-run time limits,
//!   retries and dead-lettering
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod gemini;
pub mod logging;
pub mod media;
pub mod metrics;
pub mod pipeline;
pub mod providers;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use gemini::{GeminiClient, GeminiConfig};
pub use logging::JobLogger;
pub use media::StorageMediaRetrieval;
pub use pipeline::{CleanupReport, Pipeline, RunOutcome, StepOutcome};
pub use providers::{ContextProvider, MediaRetrieval, Summarizer};
