//! Storage error types.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to locate module: {0}")]
    NotFound(String),

    #[error("module already exists: {0}")]
    AlreadyExists(String),

    #[error("failed to upload module to {key}: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to list module versions under {prefix}: {source}")]
    ListFailed {
        prefix: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to sign download url for {key}: {reason}")]
    Presign { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] BoxError),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub(crate) fn upload_failed(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::UploadFailed {
            key: key.into(),
            source: source.into(),
        }
    }

    pub(crate) fn list_failed(prefix: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ListFailed {
            prefix: prefix.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
