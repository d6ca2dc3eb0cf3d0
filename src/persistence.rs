//! Optional snapshot persistence collaborator.
//!
//! The core's stores expose their state as an opaque serializable map
//! `{key: {value, timestamp}}`. Persisting it is best-effort: absence of
//! a store, or a failed save, never affects correctness within a run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{FlightdeckError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Opaque snapshot shape shared by BoundedStore, ResultCache, and
/// ContextWindow exports.
pub type Snapshot = HashMap<String, SnapshotEntry>;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load a named snapshot. `Ok(None)` means no snapshot exists yet.
    async fn load(&self, name: &str) -> Result<Option<Snapshot>>;

    async fn save(&self, name: &str, snapshot: &Snapshot) -> Result<()>;
}

/// File-backed snapshot store with atomic writes.
///
/// Writes go to a temp file, are synced, then renamed over the target;
/// leftover temp files from interrupted writes are swept on `init`.
pub struct FileSnapshotStore {
    snapshots_dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            snapshots_dir: base_dir.join("snapshots"),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.snapshots_dir).await?;
        self.recover_interrupted_writes().await;
        Ok(())
    }

    async fn recover_interrupted_writes(&self) {
        if let Ok(mut entries) = fs::read_dir(&self.snapshots_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    debug!(path = %path.display(), "Removing interrupted snapshot write");
                    let _ = fs::remove_file(&path).await;
                }
            }
        }
    }

    async fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, content).await?;

        let tmp_path_clone = tmp_path.clone();
        let sync_result = tokio::task::spawn_blocking(move || {
            std::fs::File::open(&tmp_path_clone).and_then(|file| file.sync_all())
        })
        .await;
        match sync_result {
            Err(e) => warn!(error = %e, "Failed to sync snapshot temp file"),
            Ok(Err(e)) => warn!(error = %e, "Failed to sync snapshot temp file"),
            Ok(Ok(())) => {}
        }

        fs::rename(&tmp_path, path).await?;
        debug!(path = %path.display(), "Snapshot written");
        Ok(())
    }

    fn snapshot_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name
                .chars()
                .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        {
            return Err(FlightdeckError::Snapshot(format!(
                "invalid snapshot name: {:?}",
                name
            )));
        }
        Ok(self.snapshots_dir.join(format!("{}.json", name)))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self, name: &str) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    async fn save(&self, name: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.snapshot_path(name)?;
        let content = serde_json::to_string_pretty(snapshot)?;
        self.write_atomic(&path, &content).await
    }
}
