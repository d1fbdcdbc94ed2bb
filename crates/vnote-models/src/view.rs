//! Read-side projection of a job returned to clients.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobStatus, VideoJob};

/// A job as shown to its owner: stored fields plus an optional signed
/// playback URL. Built from a [`VideoJob`]; never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoJobView {
    pub id: JobId,
    pub filename: String,
    pub status: JobStatus,
    pub source_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time-limited URL for playing back the source video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoJobView {
    pub fn from_job(job: VideoJob, signed_url: Option<String>) -> Self {
        Self {
            id: job.id,
            filename: job.filename,
            status: job.status,
            source_reference: job.source_reference,
            audio_reference: job.audio_reference,
            transcript: job.transcript,
            summary: job.summary,
            error: job.error,
            signed_url,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
