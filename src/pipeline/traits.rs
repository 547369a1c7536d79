//! Seams to the external collaborators the pipeline drives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::transcript::{RawTranscription, Transcript};

/// Produces mono 16 kHz (or equivalent) audio the recognizer accepts.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(&self, video: &Path, audio_out: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub language: String,
    pub word_timestamps: bool,
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Whether word-level timestamps can be produced at all. Checked once
    /// when the pipeline is built.
    fn supports_word_timestamps(&self) -> bool;

    async fn transcribe(&self, audio: &Path, request: &RecognitionRequest) -> Result<RawTranscription>;
}

/// Cuts `[start, end)` out of a video without re-encoding.
#[async_trait]
pub trait Trimmer: Send + Sync {
    async fn cut(&self, video: &Path, start: f64, end: f64, output: &Path) -> Result<()>;
}

#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Container duration in seconds, `None` when the file does not say.
    async fn duration(&self, video: &Path) -> Result<Option<f64>>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Final location of an upload, with its directory created.
    async fn video_path(&self, video_id: &str, extension: &str) -> Result<PathBuf>;

    /// Looks for an uploaded video with any of the given extensions.
    async fn find_video(&self, video_id: &str, extensions: &[String]) -> Result<Option<PathBuf>>;

    async fn save_transcript(&self, transcript: &Transcript) -> Result<()>;

    async fn load_transcript(&self, video_id: &str) -> Result<Option<Transcript>>;

    async fn delete_transcript(&self, video_id: &str) -> Result<bool>;

    /// A fresh path under the temp directory. Nothing is created.
    fn temp_path(&self, stem: &str, extension: &str) -> PathBuf;

    /// Idempotent: a missing file is not an error.
    async fn delete_if_exists(&self, path: &Path) -> Result<bool>;

    /// Removes temp files last modified more than `age` ago.
    async fn remove_stale_temp_files(&self, age: Duration) -> Result<usize>;
}
