//! Audio extraction for speech-to-text.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Target encoding for an extracted audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub codec: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    pub extension: &'static str,
    pub mime_type: &'static str,
}

/// 16 kHz mono signed 16-bit PCM WAV, the input speech engines expect.
pub const SPEECH_AUDIO: AudioFormat = AudioFormat {
    codec: "pcm_s16le",
    sample_rate: 16_000,
    channels: 1,
    extension: "wav",
    mime_type: "audio/wav",
};

impl AudioFormat {
    /// Apply this format to an FFmpeg command, dropping any video streams.
    pub fn apply(&self, cmd: FfmpegCommand) -> FfmpegCommand {
        cmd.no_video()
            .audio_codec(self.codec)
            .sample_rate(self.sample_rate)
            .channels(self.channels)
    }
}

/// Extract the audio track of `video` into `output` as [`SPEECH_AUDIO`].
///
/// Fails with [`MediaError::FileNotFound`] if the input does not exist and
/// with [`MediaError::FfmpegFailed`] if FFmpeg cannot decode it.
pub async fn extract_audio(
    runner: &FfmpegRunner,
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let output = output.as_ref();

    if !tokio::fs::try_exists(video).await.unwrap_or(false) {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let cmd = SPEECH_AUDIO.apply(FfmpegCommand::new(video, output));
    debug!(
        input = %video.display(),
        output = %output.display(),
        "Extracting audio"
    );
    runner.run(&cmd).await?;

    let size = tokio::fs::metadata(output).await?.len();
    if size == 0 {
        return Err(MediaError::ffmpeg_failed(
            "FFmpeg produced an empty audio file",
            None,
            None,
        ));
    }

    info!(output = %output.display(), bytes = size, "Audio extracted");
    Ok(output.to_path_buf())
}
