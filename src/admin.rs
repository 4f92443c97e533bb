//! Storage administration commands
//!
//! Shell-like operations over the storage port for operators: listing,
//! moving, copying between local disk and storage, removal and age-based
//! clearing. Destructive defaults (clearing or removing the whole root, or
//! clearing without an age threshold) are refused unless `--force` is given.

use crate::engine::{RelocateOutcome, RelocationEngine, UnlinkOutcome};
use crate::error::StorageError;
use crate::storage::{join_path, normalize_path, Storage};
use crate::value::FileRef;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const FORCE_WARNING: &str =
    "WARNING If you want to delete all files, use the parameter -f (--force)";

/// Storage CLI commands
#[derive(Debug, Subcommand)]
pub enum StorageCommand {
    /// Show files in a folder
    Ls {
        #[arg(default_value = "")]
        directory: String,
        /// List subfolders too
        #[arg(short, long)]
        recursive: bool,
    },

    /// Move a file
    Mv { source: String, destination: String },

    /// Copy a file
    Cp { source: String, destination: String },

    /// Copy between the local disk and storage (direction picked by which source exists)
    Scp {
        source: String,
        destination: String,
        /// Overwrite an existing destination
        #[arg(short, long)]
        force: bool,
    },

    /// Delete a file or a folder
    Rm {
        path: String,
        /// Required to remove the storage root
        #[arg(short, long)]
        force: bool,
    },

    /// Remove old files
    Clear(ClearArgs),

    /// Move temp files into the upload folder
    Relocate {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Delete files from the upload folder
    Unlink {
        #[arg(required = true)]
        files: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct ClearArgs {
    #[arg(default_value = "")]
    pub path: String,
    /// Include subfolders
    #[arg(short, long)]
    pub recursive: bool,
    /// Only delete files older than this many days
    #[arg(short = 'o', long = "older-than", default_value_t = 0)]
    pub older_than: u32,
    #[arg(short, long)]
    pub force: bool,
}

/// Text produced by a command
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
    pub warnings: Vec<String>,
}

impl CommandOutput {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Any spelling that normalizes to the storage root (`""`, `/`, `.`, `//`)
fn is_root(path: &str) -> bool {
    normalize_path(path.trim())
        .map(|p| p.is_empty())
        .unwrap_or(false)
}

pub struct StorageAdmin<S: Storage + ?Sized> {
    storage: Arc<S>,
    engine: RelocationEngine<S>,
}

impl<S: Storage + ?Sized> StorageAdmin<S> {
    pub fn new(engine: RelocationEngine<S>) -> Self {
        Self {
            storage: Arc::clone(engine.storage()),
            engine,
        }
    }

    pub async fn run(&self, command: StorageCommand) -> Result<CommandOutput, StorageError> {
        match command {
            StorageCommand::Ls {
                directory,
                recursive,
            } => self.ls(&directory, recursive).await,
            StorageCommand::Mv {
                source,
                destination,
            } => {
                self.storage.move_file(&source, &destination).await?;
                Ok(CommandOutput::default())
            }
            StorageCommand::Cp {
                source,
                destination,
            } => {
                self.storage.copy_file(&source, &destination).await?;
                Ok(CommandOutput::default())
            }
            StorageCommand::Scp {
                source,
                destination,
                force,
            } => self.scp(&source, &destination, force).await,
            StorageCommand::Rm { path, force } => self.rm(&path, force).await,
            StorageCommand::Clear(args) => self.clear(&args).await,
            StorageCommand::Relocate { files } => self.relocate(files).await,
            StorageCommand::Unlink { files } => self.unlink(files).await,
        }
    }

    pub async fn ls(&self, directory: &str, recursive: bool) -> Result<CommandOutput, StorageError> {
        let mut output = CommandOutput::default();
        for entry in self.storage.list(directory, recursive).await? {
            let mut line = String::new();
            if let Some(modified) = entry.modified {
                line.push_str(&modified.format("%Y-%m-%d %H:%M:%S").to_string());
                line.push('\t');
            }
            line.push(if entry.is_dir() { 'D' } else { 'F' });
            line.push(' ');
            line.push_str(if recursive { &entry.path } else { &entry.basename });
            output.line(line);
        }
        Ok(output)
    }

    pub async fn scp(
        &self,
        source: &str,
        destination: &str,
        force: bool,
    ) -> Result<CommandOutput, StorageError> {
        let mut output = CommandOutput::default();

        if tokio::fs::try_exists(source).await? {
            let mut destination = destination.to_string();
            if destination.ends_with('/') || self.storage.is_directory(&destination).await? {
                let name = Path::new(source)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                destination = join_path(&destination, &name);
            }
            if !force && self.storage.exists(&destination).await? {
                output.warn(format!("{} file exist", destination));
                return Ok(output);
            }
            let data = tokio::fs::read(source).await?;
            self.storage.write(&destination, &data).await?;
            info!(from = %source, to = %destination, size = data.len(), "Uploaded local file");
            return Ok(output);
        }

        if self.storage.exists(source).await? {
            if !force && tokio::fs::try_exists(destination).await? {
                output.warn(format!("{} file exist", destination));
                return Ok(output);
            }
            let data = self.storage.read(source).await?;
            tokio::fs::write(destination, &data).await?;
            info!(from = %source, to = %destination, size = data.len(), "Downloaded file");
            return Ok(output);
        }

        output.warn(format!("{} file not exist", source));
        Ok(output)
    }

    pub async fn rm(&self, path: &str, force: bool) -> Result<CommandOutput, StorageError> {
        let mut output = CommandOutput::default();
        if is_root(path) && !force {
            output.warn(FORCE_WARNING);
            return Ok(output);
        }

        if self.storage.is_directory(path).await? {
            self.storage.delete_dir(path).await?;
        } else {
            self.storage.delete(path).await?;
        }
        info!(path = %path, "Removed");
        Ok(output)
    }

    pub async fn clear(&self, args: &ClearArgs) -> Result<CommandOutput, StorageError> {
        self.clear_at(args, Utc::now()).await
    }

    /// Clear relative to a given current time
    pub async fn clear_at(
        &self,
        args: &ClearArgs,
        now: DateTime<Utc>,
    ) -> Result<CommandOutput, StorageError> {
        let mut output = CommandOutput::default();
        if !args.force && (is_root(&args.path) || args.older_than == 0) {
            output.warn(FORCE_WARNING);
            return Ok(output);
        }

        let max_age = Duration::days(i64::from(args.older_than));
        let mut deleted = 0usize;

        for entry in self.storage.list(args.path.trim(), args.recursive).await? {
            if entry.is_dir() {
                continue;
            }
            let expired = match (args.older_than, entry.modified) {
                (0, _) => args.force,
                (_, Some(modified)) => modified
                    .checked_add_signed(max_age)
                    .map(|expires| expires < now)
                    .unwrap_or(false),
                (_, None) => false,
            };
            if expired {
                self.storage.delete(&entry.path).await?;
                info!(path = %entry.path, "Cleared file");
                deleted += 1;
            }
        }

        output.line(format!("Deleted {} files", deleted));
        Ok(output)
    }

    pub async fn relocate(&self, files: Vec<String>) -> Result<CommandOutput, StorageError> {
        let mut output = CommandOutput::default();
        for name in files {
            let file = FileRef::from(name);
            match self.engine.relocate(&file).await {
                Ok(outcome) => output.line(format!("{}: {}", file, describe_relocate(outcome))),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => output.warn(format!("{}: {}", file, e)),
            }
        }
        Ok(output)
    }

    pub async fn unlink(&self, files: Vec<String>) -> Result<CommandOutput, StorageError> {
        let mut output = CommandOutput::default();
        for name in files {
            let file = FileRef::from(name);
            match self.engine.unlink(&file).await {
                Ok(UnlinkOutcome::Deleted) => output.line(format!("{}: deleted", file)),
                Ok(UnlinkOutcome::Absent) => output.line(format!("{}: absent", file)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => output.warn(format!("{}: {}", file, e)),
            }
        }
        Ok(output)
    }
}

fn describe_relocate(outcome: RelocateOutcome) -> &'static str {
    match outcome {
        RelocateOutcome::Moved => "moved",
        RelocateOutcome::Copied => "copied",
        RelocateOutcome::Overwritten => "overwritten",
        RelocateOutcome::AlreadyPresent => "already present",
        RelocateOutcome::SkippedMissing => "skipped, temp file missing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use tempfile::TempDir;

    async fn admin() -> (StorageAdmin<MemoryStorage>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let engine = RelocationEngine::new(Arc::clone(&storage), "/temp", "/upload").unwrap();
        (StorageAdmin::new(engine), storage)
    }

    #[tokio::test]
    async fn test_ls_flat_and_recursive() {
        let (admin, storage) = admin().await;
        storage.write("/upload/a.jpg", b"a").await.unwrap();
        storage.write("/upload/sub/b.jpg", b"b").await.unwrap();

        let flat = admin.ls("/upload", false).await.unwrap();
        assert_eq!(flat.lines.len(), 2);
        assert!(flat.lines[0].ends_with("\tF a.jpg"));
        assert_eq!(flat.lines[1], "D sub");

        let deep = admin.ls("/upload", true).await.unwrap();
        assert!(deep.lines.iter().any(|l| l.ends_with("F upload/sub/b.jpg")));
    }

    #[tokio::test]
    async fn test_rm_root_needs_force() {
        let (admin, storage) = admin().await;
        storage.write("/upload/a.jpg", b"a").await.unwrap();

        let output = admin.rm("/", false).await.unwrap();
        assert_eq!(output.warnings, vec![FORCE_WARNING.to_string()]);
        assert_eq!(storage.file_paths().len(), 1);

        admin.rm("/upload", false).await.unwrap();
        assert!(storage.file_paths().is_empty());
    }

    #[tokio::test]
    async fn test_scp_local_to_storage_and_back() {
        let (admin, storage) = admin().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("report.pdf");
        std::fs::write(&local, b"pdf").unwrap();

        admin
            .scp(local.to_str().unwrap(), "/docs/", false)
            .await
            .unwrap();
        assert_eq!(storage.read("/docs/report.pdf").await.unwrap(), b"pdf");

        let again = admin
            .scp(local.to_str().unwrap(), "/docs/report.pdf", false)
            .await
            .unwrap();
        assert_eq!(again.warnings, vec!["/docs/report.pdf file exist".to_string()]);

        let back = dir.path().join("copy.pdf");
        admin
            .scp("/docs/report.pdf", back.to_str().unwrap(), false)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&back).unwrap(), b"pdf");

        let missing = admin.scp("/docs/none.pdf", "x", false).await.unwrap();
        assert_eq!(missing.warnings, vec!["/docs/none.pdf file not exist".to_string()]);
    }

    #[tokio::test]
    async fn test_relocate_and_unlink_commands() {
        let (admin, storage) = admin().await;
        storage.write("/temp/a.jpg", b"a").await.unwrap();

        let output = admin
            .run(StorageCommand::Relocate {
                files: vec!["a.jpg".into(), "b.jpg".into()],
            })
            .await
            .unwrap();
        assert_eq!(output.lines, vec!["a.jpg: moved".to_string()]);
        assert_eq!(output.warnings.len(), 1);
        assert!(storage.exists("/upload/a.jpg").await.unwrap());

        let output = admin
            .run(StorageCommand::Unlink {
                files: vec!["a.jpg".into(), "a.jpg".into()],
            })
            .await
            .unwrap();
        assert_eq!(output.lines, vec!["a.jpg: deleted".to_string(), "a.jpg: absent".to_string()]);
    }

    #[tokio::test]
    async fn test_rm_root_spellings_need_force() {
        let (admin, storage) = admin().await;
        storage.write("/temp/a.jpg", b"a").await.unwrap();
        storage.write("/upload/b.jpg", b"b").await.unwrap();

        for path in [".", "//", "./", " / "] {
            let output = admin.rm(path, false).await.unwrap();
            assert_eq!(output.warnings, vec![FORCE_WARNING.to_string()], "path {:?}", path);
        }
        assert_eq!(storage.file_paths().len(), 2);

        admin.rm(".", true).await.unwrap();
        assert!(storage.file_paths().is_empty());
    }

    #[tokio::test]
    async fn test_clear_root_spelling_needs_force() {
        let (admin, storage) = admin().await;
        storage.write("/temp/a.jpg", b"a").await.unwrap();

        let output = admin
            .clear(&ClearArgs {
                path: "./".into(),
                older_than: 1,
                ..ClearArgs::default()
            })
            .await
            .unwrap();

        assert_eq!(output.warnings, vec![FORCE_WARNING.to_string()]);
        assert_eq!(storage.file_paths().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_huge_threshold_keeps_files() {
        let (admin, storage) = admin().await;
        storage.write("/temp/a.jpg", b"a").await.unwrap();

        let output = admin
            .clear(&ClearArgs {
                path: "/temp".into(),
                older_than: u32::MAX,
                ..ClearArgs::default()
            })
            .await
            .unwrap();

        assert_eq!(output.lines, vec!["Deleted 0 files".to_string()]);
        assert_eq!(storage.file_paths(), vec!["temp/a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_scp_force_overwrites() {
        let (admin, storage) = admin().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("report.pdf");
        std::fs::write(&local, b"new").unwrap();
        storage.write("/docs/report.pdf", b"old").await.unwrap();

        let output = admin
            .scp(local.to_str().unwrap(), "/docs/report.pdf", true)
            .await
            .unwrap();
        assert!(output.warnings.is_empty());
        assert_eq!(storage.read("/docs/report.pdf").await.unwrap(), b"new");

        let back = dir.path().join("back.pdf");
        std::fs::write(&back, b"stale").unwrap();
        let refused = admin
            .scp("/docs/report.pdf", back.to_str().unwrap(), false)
            .await
            .unwrap();
        assert_eq!(refused.warnings.len(), 1);
        assert_eq!(std::fs::read(&back).unwrap(), b"stale");

        admin
            .scp("/docs/report.pdf", back.to_str().unwrap(), true)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&back).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_scp_into_existing_storage_dir() {
        let (admin, storage) = admin().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("photo.png");
        std::fs::write(&local, b"png").unwrap();
        storage.create_dir("/images").await.unwrap();

        admin
            .scp(local.to_str().unwrap(), "/images", false)
            .await
            .unwrap();

        assert_eq!(storage.file_paths(), vec!["images/photo.png".to_string()]);
    }
}
