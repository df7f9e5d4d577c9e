//! The transport capability seen by the orchestrator

use crate::{Category, Manifest, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Source of desired bundle state.
///
/// Implementations may mutate their own working area (a checkout, a
/// scratch directory) but never the live configuration directories.
pub trait BundleTransport {
    /// Short human-readable description for logs.
    fn describe(&self) -> String;

    /// Fetch only the manifest.
    fn fetch_manifest(&self) -> Result<Manifest>;

    /// Fetch the full bundle as a local tree.
    fn fetch_bundle(&self) -> Result<BundleTree>;

    /// Hash of a single bundle file.
    fn fetch_file_hash(&self, name: &str) -> Result<String>;
}

impl<T: BundleTransport + ?Sized> BundleTransport for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn fetch_manifest(&self) -> Result<Manifest> {
        (**self).fetch_manifest()
    }

    fn fetch_bundle(&self) -> Result<BundleTree> {
        (**self).fetch_bundle()
    }

    fn fetch_file_hash(&self, name: &str) -> Result<String> {
        (**self).fetch_file_hash(name)
    }
}

/// A fetched bundle: a directory with `rules/` and `decoders/` plus the
/// manifest describing it.
///
/// A scratch directory owned by the tree is deleted when the tree is
/// dropped.
#[derive(Debug)]
pub struct BundleTree {
    root: PathBuf,
    manifest: Manifest,
    _scratch: Option<TempDir>,
}

impl BundleTree {
    /// Tree backed by a directory the caller keeps alive.
    pub fn new(root: impl Into<PathBuf>, manifest: Manifest) -> Self {
        Self {
            root: root.into(),
            manifest,
            _scratch: None,
        }
    }

    /// Tree backed by a scratch directory it owns.
    pub fn with_scratch(scratch: TempDir, manifest: Manifest) -> Self {
        Self {
            root: scratch.path().to_path_buf(),
            manifest,
            _scratch: Some(scratch),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.dir_name())
    }
}
