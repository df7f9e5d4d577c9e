//! Error types for rulesync-transport

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while fetching bundles or talking to the authority
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Credential rejected (HTTP 401/403)
    #[error("Authentication rejected by {url} (HTTP {status})")]
    Unauthorized { url: String, status: u16 },

    /// Any other non-success HTTP status
    #[error("HTTP {status} from {url}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },

    /// Connection, DNS, TLS or timeout failure
    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// Body could not be read or decoded
    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("Unsupported package format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found in bundle: {name}")]
    FileNotFound { name: String },

    #[error(transparent)]
    Fs(#[from] rulesync_fs::Error),
}

impl TransportError {
    pub(crate) fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }
}
