//! Directory tree builders and snapshots

use rulesync_fs::compute_file_checksum;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Write `(relative path, content)` pairs under `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("write_tree: create {}: {e}", parent.display()));
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("write_tree: write {}: {e}", path.display()));
    }
}

/// Every regular file under `root` by `/`-separated relative path.
///
/// A missing root yields an empty map.
pub fn snapshot_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    if root.exists() {
        collect(root, root, &mut files);
    }
    files
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("snapshot_tree: read {}: {e}", dir.display()));
    for entry in entries {
        let path = entry
            .unwrap_or_else(|e| panic!("snapshot_tree: entry in {}: {e}", dir.display()))
            .path();
        if path.is_dir() {
            collect(root, &path, files);
        } else {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let content = fs::read(&path)
                .unwrap_or_else(|e| panic!("snapshot_tree: read {}: {e}", path.display()));
            files.insert(relative, content);
        }
    }
}

/// File name to content hash for the regular files directly in `dir`.
pub fn hash_set(dir: &Path) -> BTreeMap<String, String> {
    let mut hashes = BTreeMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return hashes;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            let hash = compute_file_checksum(&path)
                .unwrap_or_else(|e| panic!("hash_set: hash {}: {e}", path.display()));
            hashes.insert(entry.file_name().to_string_lossy().into_owned(), hash);
        }
    }
    hashes
}

/// Names of hidden entries (staging or parked siblings) left in `dir`.
pub fn hidden_entries(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect();
    names.sort();
    names
}
