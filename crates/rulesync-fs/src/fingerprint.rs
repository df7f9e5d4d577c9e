//! Content fingerprint index
//!
//! Every file is identified by its name and a canonical `sha256:<hex>`
//! checksum of its contents. Directory scans are sorted by name so two
//! scans of the same content always compare equal.

use crate::{Error, FilePattern, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Read buffer size for streaming file hashes
const CHUNK: usize = 64 * 1024;

/// Metadata describing one configuration file.
///
/// Identity is `name` within its category. Serialized with the
/// authority's wire names (`hash`, `modified`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    #[serde(alias = "filename")]
    pub name: String,
    pub size: u64,
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "modified", with = "lenient_timestamp")]
    pub modified_at: DateTime<Utc>,
}

/// Compute the SHA-256 checksum of in-memory content.
pub fn compute_content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compute the SHA-256 checksum of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn compute_file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}

/// Produce the descriptor for a single file.
pub fn fingerprint(path: &Path) -> Result<FileDescriptor> {
    let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    let content_hash = compute_file_checksum(path).map_err(|e| Error::io(path, e))?;
    let modified_at = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(FileDescriptor {
        name,
        size: metadata.len(),
        content_hash,
        modified_at,
    })
}

/// Fingerprint every regular file directly inside `dir` whose name
/// matches `pattern`, sorted by name.
///
/// A missing directory scans as empty. A file that vanishes between
/// listing and hashing surfaces as an error for which
/// [`Error::is_vanished`] is true.
pub fn scan_directory(dir: &Path, pattern: &FilePattern) -> Result<Vec<FileDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut descriptors = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;
        if !file_type.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !pattern.matches(name) {
            continue;
        }
        descriptors.push(fingerprint(&path)?);
    }

    descriptors.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::trace!(dir = %dir.display(), files = descriptors.len(), "Scanned directory");
    Ok(descriptors)
}

/// Accepts RFC 3339 as well as naive ISO-8601 timestamps (taken as UTC).
mod lenient_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_checksum_has_prefix() {
        let checksum = compute_content_checksum(b"hello world");
        assert!(checksum.starts_with("sha256:"));
    }

    #[test]
    fn content_checksum_known_value() {
        let checksum = compute_content_checksum(b"hello world");
        assert_eq!(
            checksum,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn file_checksum_matches_content_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rule.xml");
        std::fs::write(&path, "<group/>").unwrap();

        let file_cs = compute_file_checksum(&path).unwrap();
        assert_eq!(file_cs, compute_content_checksum(b"<group/>"));
    }

    #[test]
    fn descriptor_parses_authority_wire_format() {
        let json = r#"{"name":"0010-rules.xml","size":12,"hash":"abc123","modified":"2024-05-01T10:20:30.123456"}"#;
        let descriptor: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.name, "0010-rules.xml");
        assert_eq!(descriptor.content_hash, "abc123");
        assert_eq!(descriptor.modified_at.to_rfc3339(), "2024-05-01T10:20:30.123456+00:00");
    }

    #[test]
    fn descriptor_accepts_filename_alias() {
        let json = r#"{"filename":"a.xml","size":1,"hash":"h","modified":"2024-05-01T10:20:30Z"}"#;
        let descriptor: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.name, "a.xml");
    }
}
