//! Speech-to-text engines.
//!
//! An engine is built once per worker process and shared by every job it
//! runs. Two engines are available:
//! - [`HttpTranscriber`]: OpenAI-compatible `/audio/transcriptions` API
//! - `WhisperTranscriber`: local whisper.cpp inference (`whisper` feature)

pub mod error;
pub mod http;
#[cfg(feature = "whisper")]
pub mod whisper;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub use error::{SpeechError, SpeechResult};
pub use http::{HttpTranscriber, HttpTranscriberConfig};
#[cfg(feature = "whisper")]
pub use whisper::{WhisperConfig, WhisperTranscriber};

/// Converts a local audio file into plain text.
///
/// Audio with no speech yields an empty string, not an error.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> SpeechResult<String>;

    /// Engine name for logs.
    fn name(&self) -> &'static str;
}

/// Build the engine selected by `TRANSCRIPTION_ENGINE` (`http` or `whisper`).
///
/// Model loading happens here, so call it once at startup.
pub fn from_env() -> SpeechResult<Arc<dyn Transcriber>> {
    let engine = std::env::var("TRANSCRIPTION_ENGINE").unwrap_or_else(|_| "http".to_string());
    let transcriber: Arc<dyn Transcriber> = match engine.as_str() {
        "http" => Arc::new(HttpTranscriber::new(HttpTranscriberConfig::from_env())?),
        #[cfg(feature = "whisper")]
        "whisper" => Arc::new(WhisperTranscriber::load(WhisperConfig::from_env()?)?),
        other => {
            return Err(SpeechError::config(format!(
                "unsupported TRANSCRIPTION_ENGINE '{}'",
                other
            )))
        }
    };
    info!(engine = transcriber.name(), "Transcription engine ready");
    Ok(transcriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_unknown_engine_is_config_error() {
        std::env::set_var("TRANSCRIPTION_ENGINE", "carrier-pigeon");
        let result = from_env();
        std::env::remove_var("TRANSCRIPTION_ENGINE");
        assert!(matches!(result, Err(SpeechError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_default_engine_is_http() {
        std::env::remove_var("TRANSCRIPTION_ENGINE");
        let transcriber = from_env().unwrap();
        assert_eq!(transcriber.name(), "http");
    }
}
