//! In-memory storage
//!
//! Keeps files in a map and records every port call, so callers can assert
//! exactly which storage operations a code path performed.

use super::{basename, normalize_path, Entry, EntryKind, Storage};
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// Storage port call kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Exists,
    Read,
    Write,
    Move,
    Copy,
    Delete,
    DeleteDir,
    CreateDir,
    List,
    Metadata,
}

/// One recorded port call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOp {
    pub kind: OpKind,
    pub path: String,
}

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, MemoryFile>,
    dirs: BTreeSet<String>,
    ops: Vec<StorageOp>,
}

impl State {
    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() || self.dirs.contains(path) {
            return true;
        }
        let prefix = format!("{}/", path);
        self.files.keys().any(|k| k.starts_with(&prefix))
            || self.dirs.iter().any(|d| d.starts_with(&prefix))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, kind: OpKind, path: &str) -> Result<(MutexGuard<'_, State>, String), StorageError> {
        let path = normalize_path(path)?;
        let mut state = self.state();
        state.ops.push(StorageOp {
            kind,
            path: path.clone(),
        });
        Ok((state, path))
    }

    /// Every port call made so far, in order
    pub fn operations(&self) -> Vec<StorageOp> {
        self.state().ops.clone()
    }

    pub fn operation_count(&self) -> usize {
        self.state().ops.len()
    }

    /// Calls that changed stored state
    pub fn mutations(&self) -> Vec<StorageOp> {
        self.state()
            .ops
            .iter()
            .filter(|op| {
                matches!(
                    op.kind,
                    OpKind::Write
                        | OpKind::Move
                        | OpKind::Copy
                        | OpKind::Delete
                        | OpKind::DeleteDir
                        | OpKind::CreateDir
                )
            })
            .cloned()
            .collect()
    }

    pub fn clear_operations(&self) {
        self.state().ops.clear();
    }

    /// Override the modification time of a stored file
    pub fn set_modified(&self, path: &str, modified: DateTime<Utc>) -> Result<(), StorageError> {
        let path = normalize_path(path)?;
        let mut state = self.state();
        match state.files.get_mut(&path) {
            Some(file) => {
                file.modified = modified;
                Ok(())
            }
            None => Err(StorageError::NotFound(path)),
        }
    }

    /// Paths of all stored files
    pub fn file_paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }
}

fn file_entry(path: &str, file: &MemoryFile) -> Entry {
    Entry {
        path: path.to_string(),
        basename: basename(path).to_string(),
        kind: EntryKind::File,
        size: file.data.len() as u64,
        modified: Some(file.modified),
    }
}

fn dir_entry(path: &str) -> Entry {
    Entry {
        path: path.to_string(),
        basename: basename(path).to_string(),
        kind: EntryKind::Dir,
        size: 0,
        modified: None,
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let (state, path) = self.record(OpKind::Exists, path)?;
        Ok(state.files.contains_key(&path) || state.is_dir(&path))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let (state, path) = self.record(OpKind::Read, path)?;
        state
            .files
            .get(&path)
            .map(|f| f.data.clone())
            .ok_or(StorageError::NotFound(path))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let (mut state, path) = self.record(OpKind::Write, path)?;
        state.files.insert(
            path,
            MemoryFile {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let (mut state, from) = self.record(OpKind::Move, from)?;
        let to = normalize_path(to)?;
        let file = state
            .files
            .remove(&from)
            .ok_or_else(|| StorageError::NotFound(from.clone()))?;
        state.files.insert(to, file);
        Ok(())
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let (mut state, from) = self.record(OpKind::Copy, from)?;
        let to = normalize_path(to)?;
        let file = state
            .files
            .get(&from)
            .cloned()
            .ok_or(StorageError::NotFound(from))?;
        state.files.insert(
            to,
            MemoryFile {
                data: file.data,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let (mut state, path) = self.record(OpKind::Delete, path)?;
        state.files.remove(&path);
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError> {
        let (mut state, path) = self.record(OpKind::DeleteDir, path)?;
        if path.is_empty() {
            state.files.clear();
            state.dirs.clear();
            return Ok(());
        }
        let prefix = format!("{}/", path);
        state.files.retain(|k, _| !k.starts_with(&prefix));
        state.dirs.retain(|d| d != &path && !d.starts_with(&prefix));
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), StorageError> {
        let (mut state, path) = self.record(OpKind::CreateDir, path)?;
        if state.files.contains_key(&path) {
            return Err(StorageError::DirectoryCreate {
                path: path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} is a file", path),
                ),
            });
        }
        if !path.is_empty() {
            state.dirs.insert(path);
        }
        Ok(())
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>, StorageError> {
        let (state, dir) = self.record(OpKind::List, dir)?;
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let mut found: BTreeMap<String, Entry> = BTreeMap::new();
        let add_dirs = |rest: &str, include_last: bool, found: &mut BTreeMap<String, Entry>| {
            let segments: Vec<&str> = rest.split('/').collect();
            let dir_count = if include_last {
                segments.len()
            } else {
                segments.len() - 1
            };
            let limit = if recursive { dir_count } else { dir_count.min(1) };
            for depth in 1..=limit {
                let path = format!("{}{}", prefix, segments[..depth].join("/"));
                found.entry(path.clone()).or_insert_with(|| dir_entry(&path));
            }
        };

        for (path, file) in state.files.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                break;
            };
            add_dirs(rest, false, &mut found);
            if recursive || !rest.contains('/') {
                found.insert(path.clone(), file_entry(path, file));
            }
        }
        for path in state.dirs.iter() {
            if let Some(rest) = path.strip_prefix(&prefix) {
                add_dirs(rest, true, &mut found);
            }
        }

        Ok(found.into_values().collect())
    }

    async fn metadata(&self, path: &str) -> Result<Option<Entry>, StorageError> {
        let (state, path) = self.record(OpKind::Metadata, path)?;
        if let Some(file) = state.files.get(&path) {
            return Ok(Some(file_entry(&path, file)));
        }
        if state.is_dir(&path) {
            return Ok(Some(dir_entry(&path)));
        }
        Ok(None)
    }
}
