//! Filesystem layer for rulesync
//!
//! Provides the content fingerprint index, glob-style file patterns,
//! atomic writes, directory copy/swap primitives and the node-local
//! deployment lock.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod io;
pub mod lock;
pub mod ops;
pub mod pattern;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use fingerprint::{
    FileDescriptor, compute_content_checksum, compute_file_checksum, fingerprint, scan_directory,
};
pub use lock::LockGuard;
pub use ops::{DirectoryOps, NativeDirectoryOps};
pub use pattern::FilePattern;
