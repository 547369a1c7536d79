use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};

use crate::config::ServerConfig;
use crate::pipeline::traits::Storage;
use crate::transcript::Transcript;

/// Directory-backed storage: uploads as `<id>.<ext>`, transcripts as
/// `<id>.json`, scratch files under a temp directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    upload_dir: PathBuf,
    transcript_dir: PathBuf,
    temp_dir: PathBuf,
}

impl FsStorage {
    pub fn new(upload_dir: PathBuf, transcript_dir: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            upload_dir,
            transcript_dir,
            temp_dir,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.upload_dir.clone(),
            config.transcript_dir.clone(),
            config.temp_dir.clone(),
        )
    }

    pub async fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.transcript_dir, &self.temp_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    fn transcript_path(&self, video_id: &str) -> PathBuf {
        self.transcript_dir.join(format!("{video_id}.json"))
    }
}

/// Ids come from clients; only plain ids may become file names.
fn check_id(video_id: &str) -> Result<()> {
    let ok = !video_id.is_empty()
        && video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    anyhow::ensure!(ok, "Invalid video id: {video_id:?}");
    Ok(())
}

#[async_trait]
impl Storage for FsStorage {
    async fn video_path(&self, video_id: &str, extension: &str) -> Result<PathBuf> {
        check_id(video_id)?;
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .with_context(|| format!("Failed to create directory {}", self.upload_dir.display()))?;
        let path = self.upload_dir.join(format!("{video_id}.{extension}"));
        debug!("Upload {video_id} goes to {}", path.display());
        Ok(path)
    }

    async fn find_video(&self, video_id: &str, extensions: &[String]) -> Result<Option<PathBuf>> {
        check_id(video_id)?;
        for ext in extensions {
            let candidate = self.upload_dir.join(format!("{video_id}.{ext}"));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn save_transcript(&self, transcript: &Transcript) -> Result<()> {
        check_id(&transcript.video_id)?;
        tokio::fs::create_dir_all(&self.transcript_dir).await?;
        let path = self.transcript_path(&transcript.video_id);
        let staging = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(transcript)?;
        tokio::fs::write(&staging, json)
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        // A reader never sees a half-written transcript.
        tokio::fs::rename(&staging, &path)
            .await
            .with_context(|| format!("Failed to move transcript into {}", path.display()))?;
        info!("Saved transcript for {} to {}", transcript.video_id, path.display());
        Ok(())
    }

    async fn load_transcript(&self, video_id: &str) -> Result<Option<Transcript>> {
        check_id(video_id)?;
        let path = self.transcript_path(video_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let transcript = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt transcript {}", path.display()))?;
        Ok(Some(transcript))
    }

    async fn delete_transcript(&self, video_id: &str) -> Result<bool> {
        check_id(video_id)?;
        self.delete_if_exists(&self.transcript_path(video_id)).await
    }

    fn temp_path(&self, stem: &str, extension: &str) -> PathBuf {
        self.temp_dir.join(format!("{stem}.{extension}"))
    }

    async fn delete_if_exists(&self, path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    async fn remove_stale_temp_files(&self, age: Duration) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.temp_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let stale = metadata.modified().map(|m| m <= cutoff).unwrap_or(false);
            if !stale {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale file {}: {e}", entry.path().display()),
            }
        }
        Ok(removed)
    }
}
