//! Gemini API client.
//!
//! Backs two pipeline collaborators:
//! - [`ContextProvider`](crate::providers::ContextProvider) via the Files API
//!   (resumable upload, poll until active, delete)
//! - [`Summarizer`](crate::providers::Summarizer) via `generateContent`

mod files;
mod summarize;

use std::time::Duration;

use reqwest::{Client, RequestBuilder};

use crate::error::{WorkerError, WorkerResult};
use crate::retry::RetryConfig;

pub use summarize::{build_prompt, NO_SPEECH_PLACEHOLDER};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini client configuration.
#[derive(Clone)]
pub struct GeminiConfig {
    /// Checked on first use, not at construction.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Delay between file state polls
    pub poll_interval: Duration,
    /// Polls before giving up on a file that never becomes active
    pub max_polls: u32,
    pub upload_retry: RetryConfig,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("poll_interval", &self.poll_interval)
            .field("max_polls", &self.max_polls)
            .finish()
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            poll_interval: Duration::from_secs(2),
            max_polls: 60,
            upload_retry: RetryConfig::new("gemini_file_upload")
                .with_attempts(5)
                .with_base_delay(Duration::from_secs(4))
                .with_max_delay(Duration::from_secs(60)),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl GeminiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("GEMINI_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.model),
            ..defaults
        }
    }
}

/// Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> WorkerResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> WorkerResult<Self> {
        Self::new(GeminiConfig::from_env())
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn api_key(&self) -> WorkerResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| WorkerError::config_error("GEMINI_API_KEY not set"))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Attach the credential header.
    fn authed(&self, request: RequestBuilder) -> WorkerResult<RequestBuilder> {
        Ok(request.header("x-goog-api-key", self.api_key()?))
    }
}

/// Map a transport error. Timeouts and connection failures are transient.
fn transport_error(err: reqwest::Error, permanent: fn(String) -> WorkerError) -> WorkerError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        WorkerError::provider_unavailable(err.to_string())
    } else {
        permanent(err.to_string())
    }
}
