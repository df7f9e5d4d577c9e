//! Directory copy and swap capability
//!
//! The orchestrator performs every live-directory mutation through this
//! trait so alternative implementations (fault injection, other
//! platforms) can be substituted.

use crate::{Result, io};
use std::path::Path;

/// Directory-level operations used for backup, staging and swapping.
pub trait DirectoryOps {
    /// Copy the tree at `src` into the not-yet-existing `dst`.
    fn copy_dir(&self, src: &Path, dst: &Path) -> Result<u64>;

    /// Atomically replace `live` with `staged`.
    fn swap_dir(&self, live: &Path, staged: &Path) -> Result<()>;
}

/// Native filesystem implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDirectoryOps;

impl DirectoryOps for NativeDirectoryOps {
    fn copy_dir(&self, src: &Path, dst: &Path) -> Result<u64> {
        io::copy_dir_all(src, dst)
    }

    fn swap_dir(&self, live: &Path, staged: &Path) -> Result<()> {
        io::swap_dir(live, staged)
    }
}
