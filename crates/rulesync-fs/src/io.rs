//! Atomic file and directory operations

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Write content atomically to a file.
///
/// Writes to a locked temp file in the same directory, syncs it, then
/// renames it over the target.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_path = sibling(path, "tmp");

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;
    temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Copy a single file, creating the destination's parent directory.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::copy(src, dst).map_err(|e| Error::io(src, e))
}

/// Recursively copy a directory tree. Returns the number of files copied.
///
/// The destination must not exist yet. Symlinks are skipped.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<u64> {
    fs::create_dir_all(dst).map_err(|e| Error::io(dst, e))?;
    if let Ok(meta) = fs::metadata(src) {
        fs::set_permissions(dst, meta.permissions()).map_err(|e| Error::io(dst, e))?;
    }

    let mut copied = 0;
    for entry in fs::read_dir(src).map_err(|e| Error::io(src, e))? {
        let entry = entry.map_err(|e| Error::io(src, e))?;
        let path = entry.path();
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;

        if file_type.is_dir() {
            copied += copy_dir_all(&path, &target)?;
        } else if file_type.is_file() {
            fs::copy(&path, &target).map_err(|e| Error::io(&path, e))?;
            copied += 1;
        } else {
            tracing::debug!(path = %path.display(), "Skipping non-regular entry");
        }
    }
    Ok(copied)
}

/// Replace `live` with `staged` using directory renames.
///
/// `live` is renamed aside, `staged` is renamed into its place, then the
/// old tree is deleted. If the second rename fails the old tree is put
/// back. Both paths must be on the same filesystem.
///
/// Readers never see a directory holding a mix of old and new files, but
/// between the two renames `live` does not exist at all. A consumer that
/// opens it in that window gets `NotFound` and must retry.
pub fn swap_dir(live: &Path, staged: &Path) -> Result<()> {
    let parked = sibling(live, "old");
    let had_live = live.exists();

    if had_live {
        fs::rename(live, &parked).map_err(|e| Error::io(live, e))?;
    }

    if let Err(e) = fs::rename(staged, live) {
        if had_live && let Err(restore) = fs::rename(&parked, live) {
            tracing::error!(
                live = %live.display(),
                parked = %parked.display(),
                error = %restore,
                "Failed to put original directory back after swap failure"
            );
        }
        return Err(Error::io(staged, e));
    }

    if had_live && let Err(e) = fs::remove_dir_all(&parked) {
        tracing::warn!(
            path = %parked.display(),
            error = %e,
            "Swap succeeded but the replaced directory could not be removed"
        );
    }

    Ok(())
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Hidden, unique sibling path: `<parent>/.<name>.<tag>-<pid>-<nanos>`.
///
/// Siblings share a filesystem with `path`, which keeps renames atomic.
pub fn sibling(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dir".to_string());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}-{}-{}", name, tag, std::process::id(), nanos))
}
