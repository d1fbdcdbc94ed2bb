//! Files API: register a local video as multimodal context.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};
use vnote_models::ContextHandle;

use super::{transport_error, GeminiClient};
use crate::error::{WorkerError, WorkerResult};
use crate::providers::ContextProvider;
use crate::retry::retry_async_if;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    state: FileState,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum FileState {
    #[default]
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

impl From<RemoteFile> for ContextHandle {
    fn from(file: RemoteFile) -> Self {
        ContextHandle {
            name: file.name,
            uri: file.uri,
            mime_type: file.mime_type,
        }
    }
}

/// MIME type for a local video, by extension.
fn video_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        _ => "application/octet-stream",
    }
}

impl GeminiClient {
    /// Two-step resumable upload: open a session, then send and finalize.
    async fn upload_once(&self, video: &Path, bytes: &[u8], mime_type: &str) -> WorkerResult<RemoteFile> {
        let display_name = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        let start = self
            .authed(self.http.post(self.url("upload/v1beta/files")))?
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| transport_error(e, WorkerError::ContextFailed))?;

        let status = start.status();
        if !status.is_success() {
            let body = start.text().await.unwrap_or_default();
            return Err(WorkerError::from_provider_status(
                status.as_u16(),
                &body,
                WorkerError::ContextFailed,
            ));
        }
        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| WorkerError::context_failed("upload session URL missing"))?;

        let response = self
            .http
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| transport_error(e, WorkerError::ContextFailed))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::from_provider_status(
                status.as_u16(),
                &body,
                WorkerError::ContextFailed,
            ));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::context_failed(format!("invalid upload response: {}", e)))?;
        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> WorkerResult<RemoteFile> {
        let response = self
            .authed(self.http.get(self.url(&format!("v1beta/{}", name))))?
            .send()
            .await
            .map_err(|e| transport_error(e, WorkerError::ContextFailed))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::from_provider_status(
                status.as_u16(),
                &body,
                WorkerError::ContextFailed,
            ));
        }
        response
            .json()
            .await
            .map_err(|e| WorkerError::context_failed(format!("invalid file response: {}", e)))
    }

    /// Poll until the file leaves `PROCESSING`.
    async fn wait_until_active(&self, mut file: RemoteFile) -> WorkerResult<RemoteFile> {
        let mut polls = 0;
        loop {
            match file.state {
                FileState::Active => return Ok(file),
                FileState::Failed => {
                    return Err(WorkerError::context_failed(format!(
                        "Gemini file processing failed for {}",
                        file.name
                    )))
                }
                FileState::Processing | FileState::StateUnspecified => {}
            }
            if polls >= self.config.max_polls {
                return Err(WorkerError::context_failed(
                    "Timeout waiting for Gemini file processing.",
                ));
            }
            polls += 1;
            debug!(file = %file.name, polls, "Waiting for file to become active");
            tokio::time::sleep(self.config.poll_interval).await;
            file = self.get_file(&file.name).await?;
        }
    }
}

#[async_trait]
impl ContextProvider for GeminiClient {
    async fn register(&self, video: &Path) -> WorkerResult<ContextHandle> {
        self.api_key()?;
        let bytes = tokio::fs::read(video).await?;
        let mime_type = video_mime_type(video);

        info!(path = %video.display(), bytes = bytes.len(), "Uploading video to Gemini");
        let uploaded = retry_async_if(&self.config.upload_retry, WorkerError::is_retryable, || {
            self.upload_once(video, &bytes, mime_type)
        })
        .await
        .into_result()?;

        match self.wait_until_active(uploaded.clone()).await {
            Ok(file) => {
                info!(file = %file.name, "Gemini file active");
                Ok(file.into())
            }
            Err(e) => {
                // The upload exists remotely even though no handle is returned
                if let Err(release_err) = self.release(&uploaded.into()).await {
                    warn!("Failed to delete unusable Gemini file: {}", release_err);
                }
                Err(e)
            }
        }
    }

    async fn release(&self, handle: &ContextHandle) -> WorkerResult<()> {
        let response = self
            .authed(self.http.delete(self.url(&format!("v1beta/{}", handle.name))))?
            .send()
            .await
            .map_err(|e| transport_error(e, WorkerError::ContextFailed))?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            debug!(file = %handle.name, "Gemini file deleted");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(file = %handle.name, status = status.as_u16(), "Gemini file delete rejected");
        Err(WorkerError::from_provider_status(
            status.as_u16(),
            &body,
            WorkerError::ContextFailed,
        ))
    }
}
