//! Media retrieval backed by object storage and FFmpeg.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use vnote_media::{FfmpegRunner, SPEECH_AUDIO};
use vnote_storage::{audio_key, ObjectStore};

use crate::error::WorkerResult;
use crate::providers::MediaRetrieval;

pub struct StorageMediaRetrieval {
    storage: Arc<dyn ObjectStore>,
    runner: FfmpegRunner,
}

impl StorageMediaRetrieval {
    pub fn new(storage: Arc<dyn ObjectStore>, ffmpeg_timeout: Duration) -> Self {
        Self {
            storage,
            runner: FfmpegRunner::new().with_timeout(ffmpeg_timeout.as_secs()),
        }
    }
}

#[async_trait]
impl MediaRetrieval for StorageMediaRetrieval {
    async fn fetch(&self, source_reference: &str, dest: &Path) -> WorkerResult<()> {
        debug!(key = source_reference, dest = %dest.display(), "Fetching source video");
        self.storage.download_file(source_reference, dest).await?;
        Ok(())
    }

    async fn extract_audio(&self, video: &Path, dest: &Path) -> WorkerResult<()> {
        vnote_media::extract_audio(&self.runner, video, dest).await?;
        Ok(())
    }

    async fn store_audio(&self, audio: &Path) -> WorkerResult<String> {
        let key = audio_key(SPEECH_AUDIO.extension);
        self.storage
            .upload_file(audio, &key, SPEECH_AUDIO.mime_type)
            .await?;
        Ok(key)
    }

    async fn fetch_audio(&self, audio_reference: &str, dest: &Path) -> WorkerResult<()> {
        debug!(key = audio_reference, "Reusing staged audio");
        self.storage.download_file(audio_reference, dest).await?;
        Ok(())
    }
}
