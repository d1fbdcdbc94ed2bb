//! Object storage for uploaded videos and extracted audio.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait used by the worker and the upload path
//! - An S3-compatible client (R2, GCS interoperability, MinIO, AWS)
//! - A filesystem-backed store for local development and tests
//! - Object key helpers for videos and audio

pub mod client;
pub mod error;
pub mod keys;
pub mod local;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

pub use client::{S3Client, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use keys::{audio_key, video_key, AUDIO_PREFIX, VIDEO_PREFIX};
pub use local::LocalObjectStore;

/// Default lifetime of a signed playback URL.
pub const VIEW_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// Remote object storage addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `key`.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Download `key` into `path`.
    ///
    /// Fails with [`StorageError::NotFound`] if the key does not exist. No
    /// partial file is left behind on failure.
    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// Delete `key`. Deleting an absent key succeeds.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Generate a time-limited GET URL for `key`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}
