//! Local whisper.cpp transcription.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::{SpeechError, SpeechResult};
use crate::Transcriber;

const SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to a ggml model file (e.g. `ggml-base.bin`)
    pub model_path: PathBuf,
    /// ISO language code; `None` auto-detects
    pub language: Option<String>,
    pub num_threads: u16,
}

impl WhisperConfig {
    pub fn from_env() -> SpeechResult<Self> {
        let model_path = std::env::var("WHISPER_MODEL_PATH")
            .map_err(|_| SpeechError::config("WHISPER_MODEL_PATH not set"))?;
        Ok(Self {
            model_path: PathBuf::from(model_path),
            language: std::env::var("TRANSCRIPTION_LANGUAGE")
                .ok()
                .filter(|s| !s.is_empty()),
            num_threads: std::env::var("WHISPER_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        })
    }
}

/// Whisper model loaded once and shared across jobs.
pub struct WhisperTranscriber {
    context: Arc<WhisperContext>,
    config: WhisperConfig,
}

impl WhisperTranscriber {
    /// Load the model. Blocking and slow; call once at startup.
    pub fn load(config: WhisperConfig) -> SpeechResult<Self> {
        if !config.model_path.exists() {
            return Err(SpeechError::ModelLoad(format!(
                "model file not found: {}",
                config.model_path.display()
            )));
        }

        info!("Loading Whisper model from {}", config.model_path.display());
        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| SpeechError::ModelLoad("invalid path encoding".to_string()))?;
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| SpeechError::ModelLoad(e.to_string()))?;

        Ok(Self {
            context: Arc::new(context),
            config,
        })
    }

    fn run(context: &WhisperContext, config: &WhisperConfig, audio: &Path) -> SpeechResult<String> {
        let samples = load_samples(audio)?;
        debug!(
            "Loaded {} audio samples ({:.2}s)",
            samples.len(),
            samples.len() as f64 / SAMPLE_RATE as f64
        );

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(i32::from(config.num_threads));
        if let Some(lang) = &config.language {
            params.set_language(Some(lang.as_str()));
        }
        params.set_print_progress(false);
        params.set_print_realtime(false);

        let mut state = context
            .create_state()
            .map_err(|e| SpeechError::TranscriptionFailed(e.to_string()))?;
        state
            .full(params, &samples)
            .map_err(|e| SpeechError::TranscriptionFailed(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(segment.to_string().trim());
            text.push(' ');
        }
        Ok(text.trim().to_string())
    }
}

/// Read a 16 kHz mono WAV into f32 samples in [-1.0, 1.0].
pub(crate) fn load_samples(audio: &Path) -> SpeechResult<Vec<f32>> {
    let mut reader = hound::WavReader::open(audio)
        .map_err(|e| SpeechError::AudioLoad(format!("{}: {}", audio.display(), e)))?;
    let spec = reader.spec();

    if spec.sample_rate != SAMPLE_RATE {
        return Err(SpeechError::AudioLoad(format!(
            "expected {}Hz sample rate, got {}Hz",
            SAMPLE_RATE, spec.sample_rate
        )));
    }
    if spec.channels != 1 {
        return Err(SpeechError::AudioLoad(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }

    let read_err = |e: hound::Error| SpeechError::AudioLoad(format!("failed to read sample: {}", e));
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val).map_err(read_err))
                .collect()
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(read_err))
            .collect(),
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> SpeechResult<String> {
        let context = Arc::clone(&self.context);
        let config = self.config.clone();
        let audio = audio.to_path_buf();

        tokio::task::spawn_blocking(move || Self::run(&context, &config, &audio))
            .await
            .map_err(|e| SpeechError::TranscriptionFailed(format!("inference task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_samples_normalizes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, SAMPLE_RATE, 1, &[0, i16::MAX, i16::MIN]);

        let samples = load_samples(&path).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples[1] > 0.99 && samples[2] <= -0.99);
    }

    #[test]
    fn test_load_samples_rejects_wrong_format() {
        let dir = TempDir::new().unwrap();
        let stereo = dir.path().join("stereo.wav");
        write_wav(&stereo, SAMPLE_RATE, 2, &[0, 0]);
        assert!(matches!(load_samples(&stereo), Err(SpeechError::AudioLoad(_))));

        let hifi = dir.path().join("hifi.wav");
        write_wav(&hifi, 44_100, 1, &[0]);
        assert!(matches!(load_samples(&hifi), Err(SpeechError::AudioLoad(_))));
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let result = WhisperTranscriber::load(WhisperConfig {
            model_path: PathBuf::from("/nonexistent/ggml-base.bin"),
            language: None,
            num_threads: 1,
        });
        assert!(matches!(result, Err(SpeechError::ModelLoad(_))));
    }
}
