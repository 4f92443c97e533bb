//! Storage port
//!
//! The relocation engine, the upload receiver and the admin commands only talk
//! to storage through the [`Storage`] trait. Paths are `/`-separated and
//! relative to the adapter's root; a leading `/` is accepted and ignored.
//!
//! Adapters:
//! - [`LocalStorage`] - a directory on the local disk
//! - [`MemoryStorage`] - in-process map, records every call (tests, dry runs)

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod local;
pub mod memory;

pub use local::LocalStorage;
pub use memory::{MemoryStorage, OpKind, StorageOp};

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry returned by [`Storage::list`] / [`Storage::metadata`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// Normalized path relative to the storage root
    pub path: String,
    /// Last path segment
    pub basename: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a file, replacing any previous content. Parent directories are created.
    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Move a file, replacing any existing destination. The destination is
    /// never visible half-written.
    async fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Copy a file, replacing any existing destination
    async fn copy_file(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Delete a file. Deleting a missing path succeeds.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Delete a directory and everything below it
    async fn delete_dir(&self, path: &str) -> Result<(), StorageError>;

    /// Create a directory and its parents. Existing directories are fine.
    async fn create_dir(&self, path: &str) -> Result<(), StorageError>;

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>, StorageError>;

    /// Metadata for a path, `None` if it does not exist
    async fn metadata(&self, path: &str) -> Result<Option<Entry>, StorageError>;

    async fn is_directory(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.metadata(path).await?.map(|e| e.is_dir()).unwrap_or(false))
    }
}

/// Normalize a storage path: drop empty and `.` segments, reject `..`.
///
/// The root itself normalizes to the empty string.
pub fn normalize_path(path: &str) -> Result<String, StorageError> {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(StorageError::InvalidPath(path.to_string())),
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Last segment of a normalized path
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a directory and a relative name with a single `/`
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}
