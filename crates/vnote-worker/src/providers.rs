//! Collaborators the pipeline drives.
//!
//! The pipeline only sees these traits. Production wiring lives in
//! [`crate::media`] and [`crate::gemini`]; tests substitute fakes.

use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use vnote_models::ContextHandle;

use crate::error::WorkerResult;

/// Moves media between remote storage and the local work directory.
#[async_trait]
pub trait MediaRetrieval: Send + Sync {
    /// Download the uploaded video at `source_reference` into `dest`.
    async fn fetch(&self, source_reference: &str, dest: &Path) -> WorkerResult<()>;

    /// Extract a speech-ready audio track from `video` into `dest`.
    async fn extract_audio(&self, video: &Path, dest: &Path) -> WorkerResult<()>;

    /// Upload extracted audio and return its remote reference.
    async fn store_audio(&self, audio: &Path) -> WorkerResult<String>;

    /// Download previously staged audio into `dest`.
    async fn fetch_audio(&self, audio_reference: &str, dest: &Path) -> WorkerResult<()>;
}

/// Registers a video with a multimodal analysis service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn register(&self, video: &Path) -> WorkerResult<ContextHandle>;

    /// Delete the remote asset. Callers log and ignore failures.
    async fn release(&self, handle: &ContextHandle) -> WorkerResult<()>;
}

/// Turns a transcript (plus optional visual context) into notes.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// A blank transcript is valid input; the video context carries the run.
    async fn summarize(
        &self,
        transcript: &str,
        context: Option<&ContextHandle>,
    ) -> WorkerResult<String>;
}
