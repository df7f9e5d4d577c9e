//! In-memory bundle archives

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// Zip archive holding `(relative path, content)` entries.
pub fn zip_bundle(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap_or_else(|e| panic!("zip_bundle: start {name}: {e}"));
        writer
            .write_all(content.as_bytes())
            .unwrap_or_else(|e| panic!("zip_bundle: write {name}: {e}"));
    }
    writer
        .finish()
        .unwrap_or_else(|e| panic!("zip_bundle: finish: {e}"))
        .into_inner()
}

/// Gzip-compressed tar archive holding `(relative path, content)` entries.
pub fn tar_gz_bundle(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap_or_else(|e| panic!("tar_gz_bundle: append {name}: {e}"));
    }
    builder
        .into_inner()
        .unwrap_or_else(|e| panic!("tar_gz_bundle: finish tar: {e}"))
        .finish()
        .unwrap_or_else(|e| panic!("tar_gz_bundle: finish gzip: {e}"))
}
