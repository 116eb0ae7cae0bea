/// Errors produced by the storage layer.
///
/// Absence of a key is not an error: reads return `Ok(None)` instead.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to {operation}: {status} {status_text}")]
    Http {
        operation: &'static str,
        status: u16,
        status_text: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Storage quota exceeded ({needed} bytes needed, quota is {quota} bytes)")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Namespace prefix must not be empty")]
    InvalidPrefix,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// True when the underlying medium refused a write because it is full.
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
