//! Snapshots of the live directories
//!
//! A snapshot is taken right before a swap so any failure afterwards can
//! put the node back exactly where it was. Snapshots stay on disk; only
//! a run that turns out to be a no-op discards its own.

use chrono::{DateTime, Utc};
use rulesync_fs::{ConfigStore, DirectoryOps, Error, Result, io};
use rulesync_transport::Category;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const METADATA_FILE: &str = "snapshot.toml";
const SNAPSHOT_PREFIX: &str = "rulesync-";

/// What was captured for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub category: Category,
    /// Live directory the copy was taken from
    pub source: PathBuf,
    /// False when the live directory did not exist
    pub present: bool,
    pub files: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub node_id: String,
    pub categories: Vec<CategorySnapshot>,
}

/// A snapshot directory on disk.
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    path: PathBuf,
    metadata: SnapshotMetadata,
}

/// Creates snapshots under a backup root.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy each `(category, live dir)` into a new timestamped snapshot.
    ///
    /// A partially written snapshot is removed before the error is
    /// returned.
    pub fn create(
        &self,
        node_id: &str,
        sources: &[(Category, &Path)],
        ops: &dyn DirectoryOps,
    ) -> Result<BackupSnapshot> {
        let created_at = Utc::now();
        let path = self.root.join(format!(
            "{}{}",
            SNAPSHOT_PREFIX,
            created_at.format("%Y%m%d_%H%M%S_%6f")
        ));

        fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;
        fs::create_dir(&path).map_err(|e| Error::io(&path, e))?;

        match Self::fill(&path, node_id, created_at, sources, ops) {
            Ok(metadata) => {
                tracing::info!(path = %path.display(), "Created backup snapshot");
                Ok(BackupSnapshot { path, metadata })
            }
            Err(e) => {
                if let Err(cleanup) = io::remove_dir_if_exists(&path) {
                    tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial snapshot");
                }
                Err(e)
            }
        }
    }

    fn fill(
        path: &Path,
        node_id: &str,
        created_at: DateTime<Utc>,
        sources: &[(Category, &Path)],
        ops: &dyn DirectoryOps,
    ) -> Result<SnapshotMetadata> {
        let mut categories = Vec::with_capacity(sources.len());
        for (category, source) in sources {
            let present = source.is_dir();
            let files = if present {
                ops.copy_dir(source, &path.join(category.dir_name()))?
            } else {
                0
            };
            tracing::debug!(category = %category, files, present, "Snapshotted live directory");
            categories.push(CategorySnapshot {
                category: *category,
                source: source.to_path_buf(),
                present,
                files,
            });
        }

        let metadata = SnapshotMetadata {
            created_at,
            node_id: node_id.to_string(),
            categories,
        };
        ConfigStore::new().save(&path.join(METADATA_FILE), &metadata)?;
        Ok(metadata)
    }
}

impl BackupSnapshot {
    /// Open an existing snapshot directory.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = ConfigStore::new().load(&path.join(METADATA_FILE))?;
        Ok(Self { path, metadata })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    /// Put `live` back to the captured state for `category`.
    ///
    /// The copy is staged next to `live` and swapped in, so readers see
    /// either the failed tree or the restored one. A category that did not
    /// exist at snapshot time is removed.
    pub fn restore(&self, category: Category, live: &Path, ops: &dyn DirectoryOps) -> Result<()> {
        let present = self
            .metadata
            .categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.present)
            .unwrap_or(false);

        if !present {
            io::remove_dir_if_exists(live)?;
            tracing::info!(category = %category, live = %live.display(), "Removed directory absent from snapshot");
            return Ok(());
        }

        let staged = io::sibling(live, "restore");
        let result = ops
            .copy_dir(&self.path.join(category.dir_name()), &staged)
            .and_then(|_| ops.swap_dir(live, &staged));
        if result.is_err() {
            io::remove_dir_if_exists(&staged)?;
        }
        result?;

        tracing::info!(category = %category, live = %live.display(), "Restored from snapshot");
        Ok(())
    }

    /// Delete the snapshot directory.
    pub fn discard(self) -> Result<()> {
        io::remove_dir_if_exists(&self.path)?;
        tracing::debug!(path = %self.path.display(), "Discarded backup snapshot");
        Ok(())
    }
}
