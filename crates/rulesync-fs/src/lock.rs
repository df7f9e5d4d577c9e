//! Node-local exclusive lock
//!
//! Guarantees at most one deployment per node. Acquisition never blocks:
//! a held lock is reported immediately as [`Error::AlreadyLocked`].

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Held exclusive lock. Released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Try to take the lock at `path`, creating the file if needed.
    pub fn try_acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::io(path, e))?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::AlreadyLocked {
                path: path.to_path_buf(),
            });
        }

        // Owner pid for operators; the lock itself is the flock.
        file.set_len(0).map_err(|e| Error::io(path, e))?;
        writeln!(file, "{}", std::process::id()).map_err(|e| Error::io(path, e))?;

        tracing::debug!(path = %path.display(), "Acquired deployment lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release lock");
        } else {
            tracing::debug!(path = %self.path.display(), "Released deployment lock");
        }
    }
}
