//! In-process bundle transport

use rulesync_fs::FilePattern;
use rulesync_transport::{BundleTransport, BundleTree, Manifest, Result, TransportError};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves the bundle at a fixed directory (`rules/`, `decoders/`).
///
/// Clones share the fetch counter.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
    pattern: FilePattern,
    failure: Option<String>,
    fetches: Arc<AtomicUsize>,
}

impl DirectoryTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pattern: FilePattern::new("*.xml")
                .unwrap_or_else(|e| panic!("DirectoryTransport: pattern: {e}")),
            failure: None,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A transport whose every fetch fails with a network error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        let mut transport = Self::new("/nonexistent");
        transport.failure = Some(message.into());
        transport
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(TransportError::Network {
                url: self.root.display().to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl BundleTransport for DirectoryTransport {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    fn fetch_manifest(&self) -> Result<Manifest> {
        self.check()?;
        Ok(Manifest::scan(&self.root, &self.pattern, "directory")?)
    }

    fn fetch_bundle(&self) -> Result<BundleTree> {
        let manifest = self.fetch_manifest()?;
        Ok(BundleTree::new(self.root.clone(), manifest))
    }

    fn fetch_file_hash(&self, name: &str) -> Result<String> {
        let manifest = self.fetch_manifest()?;
        manifest
            .find(name)
            .map(|(_, f)| f.content_hash.clone())
            .ok_or_else(|| TransportError::FileNotFound {
                name: name.to_string(),
            })
    }
}
