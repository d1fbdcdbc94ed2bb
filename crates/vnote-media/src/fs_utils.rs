//! Scratch file helpers.
//!
//! Pipeline runs create a handful of temporary files under a shared work
//! directory. Names are unique per call so concurrent runs never collide,
//! and removal treats an already-missing path as success.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Build a unique scratch path `<dir>/<prefix>-<uuid>.<ext>`.
pub fn scratch_path(dir: impl AsRef<Path>, prefix: &str, extension: &str) -> PathBuf {
    let name = format!("{}-{}.{}", prefix, Uuid::new_v4(), extension.trim_start_matches('.'));
    dir.as_ref().join(name)
}

/// Remove a file or directory tree.
///
/// Returns `Ok(true)` if something was removed and `Ok(false)` if the path
/// did not exist.
pub async fn remove_path(path: impl AsRef<Path>) -> io::Result<bool> {
    let path = path.as_ref();
    let metadata = match fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Blocking variant of [`remove_path`] for use from `Drop`.
pub fn remove_path_sync(path: impl AsRef<Path>) -> io::Result<bool> {
    let path = path.as_ref();
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
