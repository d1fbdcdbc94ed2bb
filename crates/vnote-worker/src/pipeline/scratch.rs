//! Per-run scratch resources and their release.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vnote_media::{remove_path, remove_path_sync, scratch_path, SPEECH_AUDIO};
use vnote_models::ContextHandle;

use crate::metrics::record_cleanup_failure;
use crate::providers::ContextProvider;

/// What happened to one cleanup step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepOutcome {
    /// Nothing to release.
    #[default]
    Skipped,
    Done,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Skipped => f.write_str("skipped"),
            StepOutcome::Done => f.write_str("done"),
            StepOutcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Outcome of each independent cleanup step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub context: StepOutcome,
    pub video: StepOutcome,
    pub audio: StepOutcome,
}

impl CleanupReport {
    pub fn has_failures(&self) -> bool {
        self.context.is_failed() || self.video.is_failed() || self.audio.is_failed()
    }
}

/// Scratch resources owned by a single run.
///
/// Local paths are reserved up front so cleanup covers partially written
/// files. If the run future is dropped before [`Scratch::release`], the
/// local paths are removed on drop.
pub struct Scratch {
    video: Option<PathBuf>,
    audio: Option<PathBuf>,
    context: Option<ContextHandle>,
}

impl Scratch {
    pub fn new(work_dir: &Path, source_reference: &str) -> Self {
        let ext = Path::new(source_reference)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("mp4");
        Self {
            video: Some(scratch_path(work_dir, "video", ext)),
            audio: Some(scratch_path(work_dir, "audio", SPEECH_AUDIO.extension)),
            context: None,
        }
    }

    pub fn video_path(&self) -> &Path {
        self.video.as_deref().unwrap_or(Path::new(""))
    }

    pub fn audio_path(&self) -> &Path {
        self.audio.as_deref().unwrap_or(Path::new(""))
    }

    /// Whether the source video has been downloaded this run.
    pub fn has_video(&self) -> bool {
        self.video.as_deref().map(Path::exists).unwrap_or(false)
    }

    pub fn set_context(&mut self, handle: ContextHandle) {
        self.context = Some(handle);
    }

    /// Release everything this run acquired.
    ///
    /// Each step runs regardless of the others; failures are logged and
    /// reported, never returned.
    pub async fn release(mut self, provider: &dyn ContextProvider) -> CleanupReport {
        let context = match self.context.take() {
            None => StepOutcome::Skipped,
            Some(handle) => match provider.release(&handle).await {
                Ok(()) => StepOutcome::Done,
                Err(e) => {
                    warn!(file = %handle.name, "Failed to release multimodal context: {}", e);
                    StepOutcome::Failed(e.to_string())
                }
            },
        };
        let video = remove_local(self.video.take(), "video").await;
        let audio = remove_local(self.audio.take(), "audio").await;

        let report = CleanupReport {
            context,
            video,
            audio,
        };
        for (step, outcome) in [
            ("context", &report.context),
            ("video", &report.video),
            ("audio", &report.audio),
        ] {
            if outcome.is_failed() {
                record_cleanup_failure(step);
            }
        }
        report
    }
}

async fn remove_local(path: Option<PathBuf>, step: &str) -> StepOutcome {
    let Some(path) = path else {
        return StepOutcome::Skipped;
    };
    match remove_path(&path).await {
        Ok(true) => {
            debug!(path = %path.display(), "Removed scratch {}", step);
            StepOutcome::Done
        }
        Ok(false) => StepOutcome::Skipped,
        Err(e) => {
            warn!(path = %path.display(), "Failed to remove scratch {}: {}", step, e);
            StepOutcome::Failed(e.to_string())
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for path in [self.video.take(), self.audio.take()].into_iter().flatten() {
            if let Err(e) = remove_path_sync(&path) {
                warn!(path = %path.display(), "Failed to remove abandoned scratch file: {}", e);
            }
        }
        if let Some(handle) = &self.context {
            warn!(file = %handle.name, "Run abandoned with an unreleased multimodal context");
        }
    }
}
