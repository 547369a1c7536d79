use std::path::{Path, PathBuf};

use actix_web::web::Bytes;
use futures_util::Stream;
use log::{debug, warn};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// A temporary file that is removed when the guard goes away.
///
/// Whatever ends the guard's life (normal completion, an error, or the HTTP
/// body being dropped because the client left) runs the same cleanup.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temp artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp artifact {}: {e}", self.path.display()),
        }
    }
}

/// A trimmed clip ready to be sent to the client.
#[derive(Debug)]
pub struct TrimmedClip {
    file: File,
    artifact: TempArtifact,
    pub len: u64,
    pub content_type: &'static str,
    pub download_name: String,
}

impl TrimmedClip {
    pub(crate) fn new(
        file: File,
        artifact: TempArtifact,
        len: u64,
        content_type: &'static str,
        download_name: String,
    ) -> Self {
        Self {
            file,
            artifact,
            len,
            content_type,
            download_name,
        }
    }

    pub fn path(&self) -> &Path {
        self.artifact.path()
    }

    /// Streams the clip in chunks. The artifact lives inside the stream
    /// state, so it is deleted once the stream finishes, fails, or is
    /// dropped early.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + 'static {
        let state = Some((self.file, self.artifact));
        futures_util::stream::unfold(state, |state| async move {
            let (mut file, artifact) = state?;
            let mut buf = vec![0u8; CHUNK_SIZE];
            match file.read(&mut buf).await {
                Ok(0) => {
                    drop(file);
                    drop(artifact);
                    None
                }
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(Bytes::from(buf)), Some((file, artifact))))
                }
                Err(e) => {
                    warn!("Read failed while streaming {}: {e}", artifact.path().display());
                    Some((Err(e), None))
                }
            }
        })
    }
}
