//! Pull-based transport: a git working copy synced to a revision

use crate::{BundleTransport, BundleTree, Manifest, Result, TransportError};
use git2::Repository;
use git2::build::CheckoutBuilder;
use rulesync_fs::FilePattern;
use std::fs;
use std::path::{Path, PathBuf};

/// Keeps a local checkout of the bundle repository at the tip of a
/// branch or tag. The working copy itself is the bundle tree.
#[derive(Debug, Clone)]
pub struct RepositoryTransport {
    url: String,
    revision: String,
    checkout: PathBuf,
    pattern: FilePattern,
}

impl RepositoryTransport {
    pub fn new(
        url: impl Into<String>,
        revision: impl Into<String>,
        checkout: impl Into<PathBuf>,
        pattern: FilePattern,
    ) -> Self {
        Self {
            url: url.into(),
            revision: revision.into(),
            checkout: checkout.into(),
            pattern,
        }
    }

    pub fn checkout_path(&self) -> &Path {
        &self.checkout
    }

    /// Bring the working copy to the tip of the configured revision.
    ///
    /// Clones on first use. Afterwards fetches from `origin` and
    /// force-checks out `FETCH_HEAD` detached, discarding local edits and
    /// untracked files. Returns the commit id.
    pub fn sync(&self) -> Result<String> {
        let repo = self.open_or_clone()?;

        {
            let mut remote = repo.find_remote("origin")?;
            remote.fetch(&[self.revision.as_str()], None, None)?;
        }

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let commit = fetch_head.peel_to_commit()?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
        repo.set_head_detached(commit.id())?;

        let id = commit.id().to_string();
        tracing::info!(
            checkout = %self.checkout.display(),
            revision = %self.revision,
            commit = %id,
            "Synced bundle repository"
        );
        Ok(id)
    }

    fn open_or_clone(&self) -> Result<Repository> {
        if self.checkout.join(".git").exists() {
            return Ok(Repository::open(&self.checkout)?);
        }

        if let Some(parent) = self.checkout.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| rulesync_fs::Error::io(parent, e))?;
        }
        tracing::info!(url = %self.url, checkout = %self.checkout.display(), "Cloning bundle repository");
        Ok(Repository::clone(&self.url, &self.checkout)?)
    }
}

impl BundleTransport for RepositoryTransport {
    fn describe(&self) -> String {
        format!("repository {}@{}", self.url, self.revision)
    }

    fn fetch_manifest(&self) -> Result<Manifest> {
        let commit = self.sync()?;
        Ok(Manifest::scan(&self.checkout, &self.pattern, commit)?)
    }

    fn fetch_bundle(&self) -> Result<BundleTree> {
        let manifest = self.fetch_manifest()?;
        Ok(BundleTree::new(self.checkout.clone(), manifest))
    }

    fn fetch_file_hash(&self, name: &str) -> Result<String> {
        let manifest = self.fetch_manifest()?;
        manifest
            .find(name)
            .map(|(_, file)| file.content_hash.clone())
            .ok_or_else(|| TransportError::FileNotFound {
                name: name.to_string(),
            })
    }
}
