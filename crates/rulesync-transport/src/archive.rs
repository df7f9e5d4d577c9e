//! Bundle archive formats and unpacking

use crate::{Result, TransportError};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

/// Archive format requested from the authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageFormat {
    #[default]
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
}

impl PackageFormat {
    /// Value of the `format` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            PackageFormat::Zip => "zip",
            PackageFormat::TarGz => "tar.gz",
        }
    }
}

impl FromStr for PackageFormat {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(PackageFormat::Zip),
            "tar.gz" | "tgz" => Ok(PackageFormat::TarGz),
            other => Err(TransportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unpack `bytes` into `dest`, returning the number of regular files
/// written. Entries whose path would leave `dest` are rejected.
pub fn unpack(bytes: &[u8], format: PackageFormat, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest).map_err(|e| rulesync_fs::Error::io(dest, e))?;
    match format {
        PackageFormat::Zip => unpack_zip(bytes, dest),
        PackageFormat::TarGz => unpack_tar_gz(bytes, dest),
    }
}

fn unpack_zip(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| TransportError::archive(format!("invalid zip archive: {}", e)))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| TransportError::archive(format!("zip entry {}: {}", index, e)))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(TransportError::archive(format!(
                "zip entry escapes destination: {}",
                entry.name()
            )));
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| rulesync_fs::Error::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| rulesync_fs::Error::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| rulesync_fs::Error::io(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| rulesync_fs::Error::io(&target, e))?;
        written += 1;
    }

    tracing::debug!(files = written, dest = %dest.display(), "Unpacked zip bundle");
    Ok(written)
}

fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| TransportError::archive(format!("invalid tar.gz archive: {}", e)))?;

    let mut written = 0;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| TransportError::archive(format!("tar entry: {}", e)))?;
        let kind = entry.header().entry_type();
        if !(kind.is_file() || kind.is_dir()) {
            tracing::debug!(kind = ?kind, "Skipping non-regular tar entry");
            continue;
        }

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| TransportError::archive(format!("tar entry: {}", e)))?;
        if !unpacked {
            let name = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(TransportError::archive(format!(
                "tar entry escapes destination: {}",
                name
            )));
        }
        if kind.is_file() {
            written += 1;
        }
    }

    tracing::debug!(files = written, dest = %dest.display(), "Unpacked tar.gz bundle");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("zip", PackageFormat::Zip)]
    #[case("ZIP", PackageFormat::Zip)]
    #[case("tar.gz", PackageFormat::TarGz)]
    #[case("tgz", PackageFormat::TarGz)]
    fn parses_format_names(#[case] input: &str, #[case] expected: PackageFormat) {
        assert_eq!(input.parse::<PackageFormat>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_format() {
        let err = "rar".parse::<PackageFormat>().unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedFormat(f) if f == "rar"));
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = unpack(b"not an archive", PackageFormat::Zip, temp.path()).unwrap_err();
        assert!(matches!(err, TransportError::Archive { .. }));
    }
}
