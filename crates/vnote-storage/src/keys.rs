//! Object key layout.
//!
//! ```text
//! videos/{uuid}.{ext}   uploaded source videos
//! audio/{uuid}.wav      audio extracted by the worker
//! ```

use uuid::Uuid;

pub const VIDEO_PREFIX: &str = "videos";
pub const AUDIO_PREFIX: &str = "audio";

const DEFAULT_VIDEO_EXT: &str = "mp4";

/// Key for a newly uploaded video, keeping the upload's extension.
pub fn video_key(filename: &str) -> String {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_VIDEO_EXT.to_string());
    format!("{}/{}.{}", VIDEO_PREFIX, Uuid::new_v4(), ext)
}

/// Key for an extracted audio track.
pub fn audio_key(extension: &str) -> String {
    format!(
        "{}/{}.{}",
        AUDIO_PREFIX,
        Uuid::new_v4(),
        extension.trim_start_matches('.')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_key_keeps_extension() {
        let key = video_key("Lecture 1.MOV");
        assert!(key.starts_with("videos/"));
        assert!(key.ends_with(".mov"));
    }

    #[test]
    fn test_video_key_defaults_extension() {
        assert!(video_key("no-extension").ends_with(".mp4"));
        assert!(video_key("weird.m/p4").ends_with(".mp4"));
    }

    #[test]
    fn test_audio_keys_are_unique() {
        let a = audio_key("wav");
        let b = audio_key(".wav");
        assert_ne!(a, b);
        assert!(a.starts_with("audio/") && b.ends_with(".wav"));
    }
}
