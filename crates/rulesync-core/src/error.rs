//! Error types for rulesync-core

use rulesync_transport::Category;
use std::path::PathBuf;

pub use crate::activation::ActivationError;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] rulesync_fs::Error),

    #[error(transparent)]
    Transport(#[from] rulesync_transport::TransportError),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error(transparent)]
    Ledger(#[from] rulesync_ledger::Error),

    /// Another run holds the node lock
    #[error("Another deployment is already running (lock held at {lock_path})")]
    AlreadyRunning { lock_path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// The staged directory differs from the manifest it was built from
    #[error("Staged {category} do not match the bundle: {message}")]
    Staging { category: Category, message: String },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
