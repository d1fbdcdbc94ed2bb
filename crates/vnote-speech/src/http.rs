//! OpenAI-compatible transcription API client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{SpeechError, SpeechResult};
use crate::Transcriber;

/// Configuration for [`HttpTranscriber`].
#[derive(Clone)]
pub struct HttpTranscriberConfig {
    /// API base URL, without the `/audio/transcriptions` suffix
    pub base_url: String,
    /// Bearer credential. Checked on first use, not at construction.
    pub api_key: Option<String>,
    pub model: String,
    pub language: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_base_delay: Duration,
    /// Upper bound on a single backoff delay
    pub retry_max_delay: Duration,
}

impl std::fmt::Debug for HttpTranscriberConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTranscriberConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("language", &self.language)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .finish()
    }
}

impl Default for HttpTranscriberConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            language: None,
            timeout: Duration::from_secs(600),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
        }
    }
}

impl HttpTranscriberConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TRANSCRIPTION_API_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("TRANSCRIPTION_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            model: std::env::var("TRANSCRIPTION_MODEL").unwrap_or(defaults.model),
            language: std::env::var("TRANSCRIPTION_LANGUAGE")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("TRANSCRIPTION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            max_retries: std::env::var("TRANSCRIPTION_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
            retry_max_delay: defaults.retry_max_delay,
        }
    }

    /// Backoff before retry number `attempt` (0-based), doubling up to `retry_max_delay`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.retry_max_delay)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes by uploading audio to a remote speech-to-text API.
pub struct HttpTranscriber {
    http: Client,
    config: HttpTranscriberConfig,
}

impl HttpTranscriber {
    pub fn new(config: HttpTranscriberConfig) -> SpeechResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(SpeechError::Network)?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn send_once(
        &self,
        api_key: &str,
        file_name: &str,
        audio: &[u8],
    ) -> SpeechResult<String> {
        let part = Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str("audio/wav")
            .map_err(|e| SpeechError::RequestFailed(e.to_string()))?;
        let mut form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::from_http_status(status.as_u16(), body));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
        Ok(parsed.text.trim().to_string())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> SpeechResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = SpeechResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        "Transcription request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &Path) -> SpeechResult<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| SpeechError::config("TRANSCRIPTION_API_KEY not set"))?;

        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| SpeechError::AudioLoad(format!("{}: {}", audio.display(), e)))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        debug!(bytes = bytes.len(), endpoint = %self.endpoint(), "Sending audio for transcription");
        self.with_retry(|| self.send_once(api_key, &file_name, &bytes))
            .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> HttpTranscriberConfig {
        HttpTranscriberConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    async fn audio_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("audio.wav");
        tokio::fs::write(&path, b"RIFF....WAVE").await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_transcribe_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "  hello world \n" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = audio_file(&dir).await;
        let transcriber =
            HttpTranscriber::new(config(format!("{}/v1", server.uri()))).unwrap();

        assert_eq!(transcriber.transcribe(&audio).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error_on_use() {
        let transcriber = HttpTranscriber::new(HttpTranscriberConfig {
            api_key: None,
            ..Default::default()
        })
        .unwrap();

        let err = transcriber
            .transcribe(Path::new("/nonexistent.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Config(_)));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "" })),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = audio_file(&dir).await;
        let transcriber = HttpTranscriber::new(config(server.uri())).unwrap();

        assert_eq!(transcriber.transcribe(&audio).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_client_errors_fail_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad audio"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = audio_file(&dir).await;
        let transcriber = HttpTranscriber::new(config(server.uri())).unwrap();

        let err = transcriber.transcribe(&audio).await.unwrap_err();
        assert!(matches!(err, SpeechError::RequestFailed(_)));
        assert!(err.to_string().contains("bad audio"));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let config = HttpTranscriberConfig {
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(config.retry_delay(0), Duration::from_millis(500));
        assert_eq!(config.retry_delay(2), Duration::from_secs(2));
        assert_eq!(config.retry_delay(5), Duration::from_secs(10));
        assert_eq!(config.retry_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", config("http://x".to_string()));
        assert!(!rendered.contains("test-key"));
    }
}
