//! Error types for upload-storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    Collision(String),

    #[error("Directory {path} cannot be created: {source}")]
    DirectoryCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Multipart error: {0}")]
    Multipart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers deciding whether to roll back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Collision,
    Io,
    Validation,
    Internal,
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Config(_) => ErrorKind::Configuration,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Collision(_) => ErrorKind::Collision,
            StorageError::DirectoryCreate { .. } | StorageError::Io(_) => ErrorKind::Io,
            StorageError::InvalidPath(_)
            | StorageError::Validation(_)
            | StorageError::Multipart(_) => ErrorKind::Validation,
            StorageError::Json(_) | StorageError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error must abort the whole lifecycle operation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::Config(_) | StorageError::DirectoryCreate { .. }
        )
    }
}
