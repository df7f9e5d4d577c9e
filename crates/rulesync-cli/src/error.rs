//! Error types for rulesync-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Exit code when another deployment holds the node lock
pub const EXIT_ALREADY_RUNNING: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] rulesync_core::Error),

    #[error(transparent)]
    Ledger(#[from] rulesync_ledger::Error),

    #[error(transparent)]
    Transport(#[from] rulesync_transport::TransportError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Core(rulesync_core::Error::AlreadyRunning { .. }) => EXIT_ALREADY_RUNNING,
            _ => 1,
        }
    }
}
