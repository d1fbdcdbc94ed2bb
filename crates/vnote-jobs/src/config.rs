//! Job service configuration.

use std::time::Duration;

use vnote_queue::DEFAULT_MAX_DURATION_SECS;
use vnote_storage::VIEW_URL_TTL;

/// Job service configuration.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Wall-clock budget handed to the worker with every dispatch
    pub max_duration: Duration,
    /// Lifetime of signed playback URLs in views
    pub view_url_ttl: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECS),
            view_url_ttl: VIEW_URL_TTL,
        }
    }
}

impl JobsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_duration: std::env::var("JOB_MAX_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_duration),
            view_url_ttl: std::env::var("VIEW_URL_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.view_url_ttl),
        }
    }
}
