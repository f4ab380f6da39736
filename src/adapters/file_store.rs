//! File Snapshot Store
//!
//! Keeps the snapshot as pretty-printed JSON on disk (`wishlists.json`).
//! Writes go to a uniquely named temp file in the same directory, are synced,
//! then renamed over the target so readers see either the old or the new
//! document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::domain::ports::SnapshotStore;
use crate::domain::Snapshot;
use crate::error::Result;

/// Default snapshot location, relative to the working directory
pub const DEFAULT_SNAPSHOT_PATH: &str = "public/wishlists.json";

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn read(&self) -> Result<Option<Snapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no snapshot on disk yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        debug!(records = snapshot.total_count, "read snapshot from disk");
        Ok(Some(snapshot))
    }

    #[instrument(skip(self, snapshot), fields(path = %self.path.display()))]
    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();

        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &self.path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(
            records = snapshot.total_count,
            bytes = body.len(),
            "wrote snapshot to disk"
        );
        Ok(())
    }
}
