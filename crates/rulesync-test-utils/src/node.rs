//! Temporary node layout

use crate::transport::DirectoryTransport;
use crate::tree::{snapshot_tree, write_tree};
use rulesync_core::DeployConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A node rooted in a temp directory:
///
/// ```text
/// <root>/live/{rules,decoders}    live configuration
/// <root>/bundle/{rules,decoders}  desired state served by `transport()`
/// <root>/backup                   snapshots
/// <root>/state                    lock file and ledger
/// ```
///
/// The config checks liveness once with no wait and never reports.
pub struct TestNode {
    temp: TempDir,
    pub config: DeployConfig,
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNode {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap_or_else(|e| panic!("TestNode: tempdir: {e}"));
        let root = temp.path();
        for dir in ["live/rules", "live/decoders", "bundle/rules", "bundle/decoders"] {
            fs::create_dir_all(root.join(dir))
                .unwrap_or_else(|e| panic!("TestNode: create {dir}: {e}"));
        }

        let config = DeployConfig {
            node_id: "test-node".into(),
            rules_dir: root.join("live/rules"),
            decoders_dir: root.join("live/decoders"),
            backup_root: root.join("backup"),
            lock_path: root.join("state/rulesync.lock"),
            ledger_path: root.join("state/ledger.sqlite3"),
            restart_timeout_secs: 5,
            verify_timeout_secs: 0,
            verify_interval_ms: 10,
            report: false,
            ..DeployConfig::default()
        };
        Self { temp, config }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn live_dir(&self) -> PathBuf {
        self.root().join("live")
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.root().join("bundle")
    }

    /// Write files relative to the live root, e.g. `rules/local.xml`.
    pub fn write_live(&self, files: &[(&str, &str)]) {
        write_tree(&self.live_dir(), files);
    }

    /// Write files relative to the bundle root.
    pub fn write_bundle(&self, files: &[(&str, &str)]) {
        write_tree(&self.bundle_dir(), files);
    }

    /// Write the same files to both live and bundle.
    pub fn write_both(&self, files: &[(&str, &str)]) {
        self.write_live(files);
        self.write_bundle(files);
    }

    pub fn transport(&self) -> DirectoryTransport {
        DirectoryTransport::new(self.bundle_dir())
    }

    /// Contents of the live directories, excluding hidden siblings.
    pub fn live_snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        snapshot_tree(&self.live_dir())
            .into_iter()
            .filter(|(path, _)| !path.split('/').any(|part| part.starts_with('.')))
            .collect()
    }

    /// Snapshot directories under the backup root, sorted.
    pub fn backups(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.config.backup_root) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();
        paths
    }
}
