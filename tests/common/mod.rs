//! Shared test fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use upload_storage::storage::normalize_path;
use upload_storage::{Entry, MemoryStorage, Storage, StorageError};

/// Storage wrapper that fails selected calls
pub struct FaultyStorage {
    pub inner: Arc<MemoryStorage>,
    fail_create_dir: bool,
    fail_move: HashSet<String>,
    fail_delete: HashSet<String>,
}

impl FaultyStorage {
    pub fn new(inner: Arc<MemoryStorage>) -> Self {
        Self {
            inner,
            fail_create_dir: false,
            fail_move: HashSet::new(),
            fail_delete: HashSet::new(),
        }
    }

    pub fn failing_create_dir(mut self) -> Self {
        self.fail_create_dir = true;
        self
    }

    /// Fail moves whose source is `path`
    pub fn failing_move(mut self, path: &str) -> Self {
        self.fail_move.insert(key(path));
        self
    }

    pub fn failing_delete(mut self, path: &str) -> Self {
        self.fail_delete.insert(key(path));
        self
    }
}

fn key(path: &str) -> String {
    normalize_path(path).unwrap_or_else(|_| path.to_string())
}

fn denied(path: &str) -> StorageError {
    StorageError::Io(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("permission denied: {}", path),
    ))
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        self.inner.write(path, data).await
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        if self.fail_move.contains(&key(from)) {
            return Err(denied(from));
        }
        self.inner.move_file(from, to).await
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        self.inner.copy_file(from, to).await
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        if self.fail_delete.contains(&key(path)) {
            return Err(denied(path));
        }
        self.inner.delete(path).await
    }

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError> {
        self.inner.delete_dir(path).await
    }

    async fn create_dir(&self, path: &str) -> Result<(), StorageError> {
        if self.fail_create_dir {
            return Err(denied(path));
        }
        self.inner.create_dir(path).await
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>, StorageError> {
        self.inner.list(dir, recursive).await
    }

    async fn metadata(&self, path: &str) -> Result<Option<Entry>, StorageError> {
        self.inner.metadata(path).await
    }
}

/// Memory storage seeded with the given files
pub async fn seeded(files: &[&str]) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    for path in files {
        storage
            .write(path, path.as_bytes())
            .await
            .expect("seed file");
    }
    storage.clear_operations();
    storage
}
