#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the video notes pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Cancellation and timeout support via tokio
//! - Speech-ready audio extraction (16 kHz mono PCM WAV)
//! - Scratch path helpers for per-run temporary files

pub mod audio;
pub mod command;
pub mod error;
pub mod fs_utils;

pub use audio::{extract_audio, AudioFormat, SPEECH_AUDIO};
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{remove_path, remove_path_sync, scratch_path};
