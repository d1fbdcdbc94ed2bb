//! Pipeline status of a video summary job.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a video summary job.
///
/// Within a single run the status only moves forward along
/// `queued → processing → transcribing → transcribed → summarizing → done`,
/// with `failed` reachable from any non-terminal state. The only backwards
/// move is the external reset to `queued` performed by regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created by the upload path, waiting for a worker
    #[default]
    Queued,
    /// Source video is being fetched and audio extracted
    Processing,
    /// Audio is staged; speech-to-text is running
    Transcribing,
    /// Transcript is persisted
    Transcribed,
    /// Summary generation is running
    Summarizing,
    /// Summary is persisted
    Done,
    /// Run ended with an error
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Transcribing,
        JobStatus::Transcribed,
        JobStatus::Summarizing,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Transcribed => "transcribed",
            JobStatus::Summarizing => "summarizing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected from the run).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Position along the happy path. `Failed` has no position.
    fn rank(&self) -> Option<u8> {
        match self {
            JobStatus::Queued => Some(0),
            JobStatus::Processing => Some(1),
            JobStatus::Transcribing => Some(2),
            JobStatus::Transcribed => Some(3),
            JobStatus::Summarizing => Some(4),
            JobStatus::Done => Some(5),
            JobStatus::Failed => None,
        }
    }

    /// Whether a single worker run may move a job from `self` to `next`.
    ///
    /// Staying in place is allowed so a stage can commit additional fields.
    /// A run's first commit is not checked against the stored status, since
    /// redelivered runs legitimately restart from an earlier stage.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(cur), Some(nxt)) => nxt >= cur,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseJobStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_roundtrip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("complete".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&JobStatus::Summarizing).unwrap();
        assert_eq!(json, "\"summarizing\"");
    }

    #[test]
    fn test_forward_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Transcribing));
        assert!(JobStatus::Transcribed.can_transition_to(JobStatus::Summarizing));
        assert!(JobStatus::Summarizing.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Summarizing));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!JobStatus::Transcribed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Summarizing.can_transition_to(JobStatus::Transcribing));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        for status in JobStatus::ALL {
            if !status.is_terminal() {
                assert!(status.can_transition_to(JobStatus::Failed), "{status}");
            }
        }
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for status in JobStatus::ALL {
            assert!(!JobStatus::Done.can_transition_to(status));
            assert!(!JobStatus::Failed.can_transition_to(status));
        }
    }
}
