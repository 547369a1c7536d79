use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::artifact::TempArtifact;
use crate::error::ClipError;

/// An upload being written straight to disk.
///
/// Bytes go to `<id>.<ext>.part` next to the final file. The partial file
/// is removed when the upload is dropped without being committed, so a
/// size breach or a broken request leaves nothing behind.
#[derive(Debug)]
pub struct PendingUpload {
    pub(crate) id: String,
    pub(crate) filename: String,
    pub(crate) extension: String,
    destination: PathBuf,
    file: File,
    partial: TempArtifact,
    written: u64,
    limit: u64,
}

/// What a committed upload left on disk.
pub(crate) struct StoredUpload {
    pub id: String,
    pub filename: String,
    pub extension: String,
    pub path: PathBuf,
    pub size: u64,
}

impl PendingUpload {
    pub(crate) async fn create(
        id: String,
        filename: String,
        extension: String,
        destination: PathBuf,
        limit: u64,
    ) -> Result<Self, ClipError> {
        let partial_path = destination.with_extension(format!("{extension}.part"));
        let file = File::create(&partial_path).await.map_err(|e| {
            ClipError::Storage(format!("Failed to create {}: {e}", partial_path.display()))
        })?;
        debug!("Receiving {filename} into {}", partial_path.display());

        Ok(Self {
            id,
            filename,
            extension,
            destination,
            file,
            partial: TempArtifact::new(partial_path),
            written: 0,
            limit,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn partial_path(&self) -> &Path {
        self.partial.path()
    }

    /// Appends one chunk. Fails as soon as the total passes the size limit;
    /// nothing past the limit is written.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), ClipError> {
        let total = self.written + chunk.len() as u64;
        if total > self.limit {
            return Err(ClipError::PayloadTooLarge {
                size: total,
                limit: self.limit,
            });
        }
        self.file.write_all(chunk).await.map_err(|e| {
            ClipError::Storage(format!("Failed to write {}: {e}", self.partial.path().display()))
        })?;
        self.written = total;
        Ok(())
    }

    /// Flushes the partial file and moves it to its final name.
    pub(crate) async fn commit(self) -> Result<StoredUpload, ClipError> {
        let Self {
            id,
            filename,
            extension,
            destination,
            mut file,
            partial,
            written,
            ..
        } = self;

        if written == 0 {
            return Err(ClipError::Validation("Uploaded file is empty".to_string()));
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(partial.path(), &destination)
            .await
            .map_err(|e| {
                ClipError::Storage(format!(
                    "Failed to move upload into {}: {e}",
                    destination.display()
                ))
            })?;
        // Nothing is left at the partial path, so the guard's cleanup is a no-op.
        drop(partial);

        Ok(StoredUpload {
            id,
            filename,
            extension,
            path: destination,
            size: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pending(dir: &Path, limit: u64) -> PendingUpload {
        PendingUpload::create(
            "abc".into(),
            "talk.mp4".into(),
            "mp4".into(),
            dir.join("abc.mp4"),
            limit,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn chunks_land_on_disk_and_commit_renames() {
        let dir = tempfile::tempdir().unwrap();
        let mut upload = pending(dir.path(), 16).await;
        let partial = upload.partial_path().to_path_buf();
        assert_eq!(partial, dir.path().join("abc.mp4.part"));

        upload.write(b"video-").await.unwrap();
        upload.write(b"bytes").await.unwrap();
        assert_eq!(upload.written(), 11);

        let stored = upload.commit().await.unwrap();
        assert_eq!(stored.size, 11);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"video-bytes");
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn limit_breach_stops_and_drop_removes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let mut upload = pending(dir.path(), 8).await;
        let partial = upload.partial_path().to_path_buf();

        upload.write(b"12345").await.unwrap();
        let err = upload.write(b"6789").await.unwrap_err();
        assert!(matches!(err, ClipError::PayloadTooLarge { size: 9, limit: 8 }));
        assert_eq!(upload.written(), 5);
        assert!(partial.exists());

        drop(upload);
        assert!(!partial.exists());
        assert!(!dir.path().join("abc.mp4").exists());
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_and_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let upload = pending(dir.path(), 8).await;
        let partial = upload.partial_path().to_path_buf();

        assert!(matches!(upload.commit().await, Err(ClipError::Validation(_))));
        assert!(!partial.exists());
    }
}
