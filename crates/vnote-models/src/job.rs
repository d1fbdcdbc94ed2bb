//! Video summary job record and the updates committed against it.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::JobStatus;

/// Longest filename accepted from the upload path.
pub const MAX_FILENAME_LEN: u64 = 255;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input accepted by the upload path when creating a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct NewVideoJob {
    #[validate(length(min = 1))]
    pub owner_id: String,

    #[validate(length(min = 1, max = 255))]
    pub filename: String,

    /// Remote locator of the uploaded video (object key)
    #[validate(length(min = 1))]
    pub source_reference: String,
}

/// A video summary job.
///
/// The worker only ever mutates a job through [`JobUpdate`]s committed by the
/// job store; every successful commit bumps `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    pub id: JobId,

    /// Owner of the upload
    pub owner_id: String,

    /// Original upload filename
    pub filename: String,

    pub status: JobStatus,

    /// Remote locator of the uploaded video. Immutable after creation.
    pub source_reference: String,

    /// Remote locator of the extracted audio. Set once, never overwritten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_reference: Option<String>,

    /// Set once transcription succeeded. Reruns reuse it unless it is blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Set only by the run that fails; cleared by a successful rerun.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency token
    #[serde(default)]
    pub version: i64,
}

impl VideoJob {
    /// Build a freshly queued job from validated upload input.
    pub fn new(input: NewVideoJob) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: input.owner_id,
            filename: input.filename,
            status: JobStatus::Queued,
            source_reference: input.source_reference,
            audio_reference: None,
            transcript: None,
            summary: None,
            error: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Whether transcription can be skipped on this run.
    ///
    /// A blank transcript is not reused; the audio is transcribed again.
    pub fn has_transcript(&self) -> bool {
        self.transcript
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Apply a committed update to this in-memory copy.
    pub fn apply(&mut self, update: &JobUpdate) {
        self.status = update.status;
        if self.audio_reference.is_none() {
            if let Some(audio) = &update.audio_reference {
                self.audio_reference = Some(audio.clone());
            }
        }
        if let Some(transcript) = &update.transcript {
            self.transcript = Some(transcript.clone());
        }
        if let Some(summary) = &update.summary {
            self.summary = Some(summary.clone());
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        } else if update.clear_error {
            self.error = None;
        }
        self.updated_at = Utc::now();
        self.version += 1;
    }

    /// Reset to `queued` ahead of a regeneration run.
    ///
    /// Transcript and audio are kept so the rerun skips straight to
    /// summarization.
    pub fn reset_for_regeneration(&mut self) {
        self.status = JobStatus::Queued;
        self.error = None;
        self.updated_at = Utc::now();
        self.version += 1;
    }
}

/// Fields written by a single pipeline commit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub audio_reference: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub clear_error: bool,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn audio_staged(audio_reference: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Transcribing,
            audio_reference: Some(audio_reference.into()),
            ..Default::default()
        }
    }

    pub fn transcribed(transcript: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Transcribed,
            transcript: Some(transcript.into()),
            ..Default::default()
        }
    }

    pub fn done(summary: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Done,
            summary: Some(summary.into()),
            clear_error: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
