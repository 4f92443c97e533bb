//! Local disk storage
//!
//! Maps storage paths onto a root directory. Writes and copies go through a
//! sibling temp file followed by a rename so a destination is never observed
//! half-written.

use super::{basename, normalize_path, Entry, EntryKind, Storage};
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Storage rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Open storage at the given directory, creating it if needed
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self, StorageError> {
        let root_dir = root_dir.as_ref().to_path_buf();

        fs::create_dir_all(&root_dir)
            .await
            .map_err(|source| StorageError::DirectoryCreate {
                path: root_dir.display().to_string(),
                source,
            })?;

        info!(path = %root_dir.display(), "Initialized local storage");

        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = normalize_path(path)?;
        if relative.is_empty() {
            return Ok(self.root_dir.clone());
        }
        Ok(self.root_dir.join(relative))
    }

    fn temp_sibling(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
    }

    async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::DirectoryCreate {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn require_file(path: &Path, name: &str) -> Result<(), StorageError> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(StorageError::InvalidPath(format!("{} is a directory", name))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Copy into a temp sibling, then rename over the destination
    async fn copy_atomic(from: &Path, to: &Path) -> Result<(), StorageError> {
        let temp_path = Self::temp_sibling(to);
        if let Err(e) = fs::copy(from, &temp_path).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, to).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    fn entry_for(&self, relative: String, meta: &std::fs::Metadata) -> Entry {
        let modified = meta.modified().ok().map(DateTime::<Utc>::from);
        Entry {
            basename: basename(&relative).to_string(),
            path: relative,
            kind: if meta.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            },
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified,
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full_path = self.full_path(path)?;
        Ok(fs::try_exists(full_path).await?)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let full_path = self.full_path(path)?;
        debug!(path = %path, size = data.len(), "local: write");

        Self::ensure_parent(&full_path).await?;

        let temp_path = Self::temp_sibling(&full_path);
        let mut file = fs::File::create(&temp_path).await?;
        if let Err(e) = file.write_all(data).await {
            drop(file);
            fs::remove_file(&temp_path).await.ok();
            return Err(e.into());
        }
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "local: rename failed");
            e
        })?;

        Ok(())
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let source = self.full_path(from)?;
        let destination = self.full_path(to)?;

        Self::require_file(&source, from).await?;
        Self::ensure_parent(&destination).await?;

        match fs::rename(&source, &destination).await {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                // Different filesystems: fall back to copy + remove
                debug!(from = %from, to = %to, error = %rename_err, "local: rename failed, copying");
                Self::copy_atomic(&source, &destination)
                    .await
                    .map_err(|_| StorageError::Io(rename_err))?;
                fs::remove_file(&source).await?;
                Ok(())
            }
        }
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let source = self.full_path(from)?;
        let destination = self.full_path(to)?;

        Self::require_file(&source, from).await?;
        Self::ensure_parent(&destination).await?;
        Self::copy_atomic(&source, &destination).await
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError> {
        let full_path = self.full_path(path)?;
        match fs::remove_dir_all(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<(), StorageError> {
        let full_path = self.full_path(path)?;
        fs::create_dir_all(&full_path)
            .await
            .map_err(|source| StorageError::DirectoryCreate {
                path: path.to_string(),
                source,
            })
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<Entry>, StorageError> {
        let base = normalize_path(dir)?;
        let mut pending = vec![base];
        let mut entries = Vec::new();

        while let Some(current) = pending.pop() {
            let full_path = self.full_path(&current)?;
            let mut read_dir = match fs::read_dir(&full_path).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(item) = read_dir.next_entry().await? {
                let name = item.file_name().to_string_lossy().to_string();
                let relative = if current.is_empty() {
                    name
                } else {
                    format!("{}/{}", current, name)
                };
                let meta = item.metadata().await?;
                if recursive && meta.is_dir() {
                    pending.push(relative.clone());
                }
                entries.push(self.entry_for(relative, &meta));
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn metadata(&self, path: &str) -> Result<Option<Entry>, StorageError> {
        let relative = normalize_path(path)?;
        let full_path = self.full_path(&relative)?;
        match fs::metadata(&full_path).await {
            Ok(meta) => Ok(Some(self.entry_for(relative, &meta))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
