//! Filesystem-backed object store.
//!
//! Keys map to paths under a root directory. Used for local development
//! without a bucket and as the storage backend in tests.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::ObjectStore;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, rejecting keys that escape the root.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(path, &dest)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;
        debug!("Stored {} at {}", key, dest.display());
        Ok(())
    }

    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        let src = self.path_for(key)?;
        if !tokio::fs::try_exists(&src).await.unwrap_or(false) {
            return Err(StorageError::not_found(key));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Err(e) = tokio::fs::copy(&src, path).await {
            let _ = tokio::fs::remove_file(path).await;
            return Err(StorageError::download_failed(format!("{}: {}", key, e)));
        }
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", key, e))),
        }
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let path = self.path_for(key)?;
        let expires_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(expires_in)
            .as_secs();
        Ok(format!("file://{}?expires={}", path.display(), expires_at))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let store = LocalObjectStore::new(root.path());

        let src = scratch.path().join("in.wav");
        tokio::fs::write(&src, b"RIFF").await.unwrap();
        store.upload_file(&src, "audio/a.wav", "audio/wav").await.unwrap();
        assert!(store.exists("audio/a.wav").await.unwrap());

        let dst = scratch.path().join("out.wav");
        store.download_file("audio/a.wav", &dst).await.unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"RIFF");

        store.delete_object("audio/a.wav").await.unwrap();
        assert!(!store.exists("audio/a.wav").await.unwrap());
        // absent keys delete cleanly
        store.delete_object("audio/a.wav").await.unwrap();
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let root = TempDir::new().unwrap();
        let store = LocalObjectStore::new(root.path());
        let dst = root.path().join("scratch").join("v.mp4");

        let err = store.download_file("videos/nope.mp4", &dst).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("not found"));
        assert!(!dst.exists());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let store = LocalObjectStore::new("/data");
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("/abs").is_err());
        assert!(store.path_for("").is_err());
        assert_eq!(
            store.path_for("videos/a.mp4").unwrap(),
            PathBuf::from("/data/videos/a.mp4")
        );
    }
}
