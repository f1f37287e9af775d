use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub const VIDEO_MP4: &str = "video/mp4";
pub const DOWNLOAD_FILE_NAME: &str = "compressed_video.mp4";

/// A file on disk that is deleted when the guard is dropped.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A fresh, not yet created path in `dir` with the given extension.
    pub fn in_dir(dir: &Path, extension: &str) -> Self {
        Self::new(dir.join(format!("{}.{}", Uuid::new_v4().simple(), extension)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Encoded output handed from a worker to the coordinator.
#[derive(Debug)]
pub struct ResultBlob {
    artifact: TempArtifact,
    pub size: u64,
    pub mime: &'static str,
}

impl ResultBlob {
    pub fn mp4(artifact: TempArtifact, size: u64) -> Self {
        Self {
            artifact,
            size,
            mime: VIDEO_MP4,
        }
    }

    pub fn path(&self) -> &Path {
        self.artifact.path()
    }
}

/// Transient download references for finished jobs.
///
/// A registered blob can be taken exactly once; whoever takes it owns the
/// file until the guard drops. Blobs nobody takes are released after the TTL.
#[derive(Clone)]
pub struct DownloadStore {
    entries: Arc<Mutex<HashMap<Uuid, ResultBlob>>>,
    ttl: Duration,
}

impl DownloadStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn register(&self, blob: ResultBlob) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.lock().await.insert(id, blob);

        let entries = self.entries.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if entries.lock().await.remove(&id).is_some() {
                info!("Released unclaimed download {}", id);
            }
        });

        id
    }

    pub async fn take(&self, id: Uuid) -> Option<ResultBlob> {
        self.entries.lock().await.remove(&id)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
