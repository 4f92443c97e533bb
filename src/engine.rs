//! Relocation engine
//!
//! Moves uploaded files from the temp location into the upload location and
//! removes files a record no longer references.
//!
//! ## Ordering
//!
//! `on_update` attempts every create before any delete. When at least one
//! create fails, no delete runs: the caller is expected to roll the record
//! back to its old value, and the old files must still be there when it does.
//! The withheld deletes are reported as `retained`.
//!
//! ## Failures
//!
//! Configuration errors and directory-creation errors abort the call with
//! `Err`. Every other per-file failure is collected into the returned
//! [`RelocationReport`] and sibling files are still processed.

use crate::config::Config;
use crate::error::{ErrorKind, StorageError};
use crate::location::{Location, ResolvedLocation};
use crate::storage::Storage;
use crate::value::{AttributeValue, FileRef, RelocationPlan};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Move or copy files out of the temp location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Move,
    /// Leave the temp file in place
    Copy,
}

/// What to do when the destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingPolicy {
    /// Treat as already relocated
    #[default]
    Keep,
    /// Report a collision
    Fail,
    /// Replace the stored file
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationOptions {
    pub transfer: TransferMode,
    pub existing: ExistingPolicy,
    /// Delete files dropped from the attribute on update
    pub unlink_old_file: bool,
    /// Delete the attribute's files when the record is deleted
    pub unlink_on_delete: bool,
    /// Report a missing temp file as skipped instead of not found
    pub skip_missing_temp: bool,
}

impl Default for RelocationOptions {
    fn default() -> Self {
        Self {
            transfer: TransferMode::Move,
            existing: ExistingPolicy::Keep,
            unlink_old_file: true,
            unlink_on_delete: true,
            skip_missing_temp: false,
        }
    }
}

impl RelocationOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            transfer: if config.move_files {
                TransferMode::Move
            } else {
                TransferMode::Copy
            },
            unlink_old_file: config.unlink_old_file,
            unlink_on_delete: config.unlink_on_delete,
            ..Self::default()
        }
    }
}

/// Result of relocating one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateOutcome {
    Moved,
    Copied,
    /// Destination existed and was replaced
    Overwritten,
    /// Destination existed, nothing done
    AlreadyPresent,
    /// Temp file missing and skipping is enabled
    SkippedMissing,
}

/// Result of unlinking one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkOutcome {
    Deleted,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    Delete,
}

#[derive(Debug)]
pub struct FileFailure {
    pub file: FileRef,
    pub stage: Stage,
    pub error: StorageError,
}

/// Aggregate outcome of one lifecycle call
#[derive(Debug, Default)]
pub struct RelocationReport {
    pub relocated: Vec<FileRef>,
    pub already_present: Vec<FileRef>,
    pub skipped: Vec<FileRef>,
    pub deleted: Vec<FileRef>,
    pub already_absent: Vec<FileRef>,
    /// Deletes withheld because a create in the same update failed
    pub retained: Vec<FileRef>,
    pub failures: Vec<FileFailure>,
}

impl RelocationReport {
    /// No file failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.retained.is_empty()
    }

    pub fn has_create_failures(&self) -> bool {
        self.failures.iter().any(|f| f.stage == Stage::Create)
    }

    pub fn failed_files(&self, kind: ErrorKind) -> Vec<&FileRef> {
        self.failures
            .iter()
            .filter(|f| f.error.kind() == kind)
            .map(|f| &f.file)
            .collect()
    }

    fn record_relocate(&mut self, file: FileRef, outcome: RelocateOutcome) {
        match outcome {
            RelocateOutcome::Moved | RelocateOutcome::Copied | RelocateOutcome::Overwritten => {
                self.relocated.push(file)
            }
            RelocateOutcome::AlreadyPresent => self.already_present.push(file),
            RelocateOutcome::SkippedMissing => self.skipped.push(file),
        }
    }

    fn record_unlink(&mut self, file: FileRef, outcome: UnlinkOutcome) {
        match outcome {
            UnlinkOutcome::Deleted => self.deleted.push(file),
            UnlinkOutcome::Absent => self.already_absent.push(file),
        }
    }

    fn fail(&mut self, file: FileRef, stage: Stage, error: StorageError) {
        warn!(file = %file, stage = ?stage, error = %error, "File operation failed");
        self.failures.push(FileFailure { file, stage, error });
    }
}

/// Relocation engine bound to a storage and a pair of locations.
///
/// Holds no per-record state; one instance serves any number of records.
pub struct RelocationEngine<S: Storage + ?Sized> {
    storage: Arc<S>,
    temp_dir: Location,
    upload_dir: Location,
    options: RelocationOptions,
}

impl<S: Storage + ?Sized> Clone for RelocationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            temp_dir: self.temp_dir.clone(),
            upload_dir: self.upload_dir.clone(),
            options: self.options,
        }
    }
}

impl<S: Storage + ?Sized> RelocationEngine<S> {
    pub fn new(
        storage: Arc<S>,
        temp_dir: impl Into<Location>,
        upload_dir: impl Into<Location>,
    ) -> Result<Self, StorageError> {
        let temp_dir = temp_dir.into();
        let upload_dir = upload_dir.into();
        temp_dir.validate("temp_dir")?;
        upload_dir.validate("upload_dir")?;

        Ok(Self {
            storage,
            temp_dir,
            upload_dir,
            options: RelocationOptions::default(),
        })
    }

    pub fn from_config(storage: Arc<S>, config: &Config) -> Result<Self, StorageError> {
        Ok(Self::new(storage, config.temp_dir.as_str(), config.upload_dir.as_str())?
            .with_options(RelocationOptions::from_config(config)))
    }

    pub fn with_options(mut self, options: RelocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RelocationOptions {
        &self.options
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Relocate every file of a freshly inserted record
    pub async fn on_create(&self, value: &AttributeValue) -> Result<RelocationReport, StorageError> {
        let files: Vec<FileRef> = value.refs().into_iter().cloned().collect();
        let mut report = RelocationReport::default();
        if files.is_empty() {
            return Ok(report);
        }

        let temp = self.temp_dir.resolve()?;
        let upload = self.upload_dir.resolve()?;
        self.ensure_dir(&upload).await?;

        self.create_all(&temp, &upload, files, &mut report).await?;

        info!(
            upload_dir = %upload,
            relocated = report.relocated.len(),
            failed = report.failures.len(),
            "Create processed"
        );
        Ok(report)
    }

    /// Reconcile storage after a record's attribute changed from `old` to `new`
    pub async fn on_update(
        &self,
        old: &AttributeValue,
        new: &AttributeValue,
    ) -> Result<RelocationReport, StorageError> {
        let mut plan = RelocationPlan::diff(old, new);
        if !self.options.unlink_old_file {
            plan.delete.clear();
        }

        let mut report = RelocationReport::default();
        if plan.is_empty() {
            debug!("Attribute unchanged, nothing to relocate");
            return Ok(report);
        }

        let upload = self.upload_dir.resolve()?;

        if !plan.create.is_empty() {
            let temp = self.temp_dir.resolve()?;
            self.ensure_dir(&upload).await?;
            self.create_all(&temp, &upload, plan.create, &mut report).await?;
        }

        if report.has_create_failures() {
            warn!(
                retained = plan.delete.len(),
                "Create failed, keeping replaced files"
            );
            report.retained = plan.delete;
        } else {
            self.delete_all(&upload, plan.delete, &mut report).await?;
        }

        info!(
            upload_dir = %upload,
            relocated = report.relocated.len(),
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "Update processed"
        );
        Ok(report)
    }

    /// Remove every file of a record about to be deleted
    pub async fn on_delete(&self, value: &AttributeValue) -> Result<RelocationReport, StorageError> {
        let mut report = RelocationReport::default();
        if !self.options.unlink_on_delete {
            return Ok(report);
        }
        let files: Vec<FileRef> = value.refs().into_iter().cloned().collect();
        if files.is_empty() {
            return Ok(report);
        }

        let upload = self.upload_dir.resolve()?;
        self.delete_all(&upload, files, &mut report).await?;

        info!(
            upload_dir = %upload,
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "Delete processed"
        );
        Ok(report)
    }

    /// Relocate a single file from temp to the upload location
    pub async fn relocate(&self, file: &FileRef) -> Result<RelocateOutcome, StorageError> {
        let temp = self.temp_dir.resolve()?;
        let upload = self.upload_dir.resolve()?;
        self.ensure_dir(&upload).await?;
        self.relocate_in(&temp, &upload, file).await
    }

    /// Delete a single file from the upload location if present
    pub async fn unlink(&self, file: &FileRef) -> Result<UnlinkOutcome, StorageError> {
        let upload = self.upload_dir.resolve()?;
        self.unlink_in(&upload, file).await
    }

    async fn ensure_dir(&self, dir: &ResolvedLocation) -> Result<(), StorageError> {
        match self.storage.create_dir(dir.as_str()).await {
            Ok(()) => Ok(()),
            Err(StorageError::Io(source)) => Err(StorageError::DirectoryCreate {
                path: dir.to_string(),
                source,
            }),
            Err(e) => Err(e),
        }
    }

    async fn create_all(
        &self,
        temp: &ResolvedLocation,
        upload: &ResolvedLocation,
        files: Vec<FileRef>,
        report: &mut RelocationReport,
    ) -> Result<(), StorageError> {
        for file in files {
            match self.relocate_in(temp, upload, &file).await {
                Ok(outcome) => report.record_relocate(file, outcome),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => report.fail(file, Stage::Create, e),
            }
        }
        Ok(())
    }

    async fn delete_all(
        &self,
        upload: &ResolvedLocation,
        files: Vec<FileRef>,
        report: &mut RelocationReport,
    ) -> Result<(), StorageError> {
        for file in files {
            match self.unlink_in(upload, &file).await {
                Ok(outcome) => report.record_unlink(file, outcome),
                Err(StorageError::NotFound(_)) => report.already_absent.push(file),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => report.fail(file, Stage::Delete, e),
            }
        }
        Ok(())
    }

    async fn relocate_in(
        &self,
        temp: &ResolvedLocation,
        upload: &ResolvedLocation,
        file: &FileRef,
    ) -> Result<RelocateOutcome, StorageError> {
        let source = temp.join(file.as_str());
        let destination = upload.join(file.as_str());

        let mut replace = false;
        if self.storage.exists(&destination).await? {
            match self.options.existing {
                ExistingPolicy::Keep => {
                    debug!(file = %file, "Already in upload location");
                    return Ok(RelocateOutcome::AlreadyPresent);
                }
                ExistingPolicy::Fail => return Err(StorageError::Collision(destination)),
                ExistingPolicy::Overwrite => replace = true,
            }
        }

        if !self.storage.exists(&source).await? {
            if self.options.skip_missing_temp {
                warn!(file = %file, source = %source, "Temp file missing, skipped");
                return Ok(RelocateOutcome::SkippedMissing);
            }
            return Err(StorageError::NotFound(source));
        }

        match self.options.transfer {
            TransferMode::Move => self.storage.move_file(&source, &destination).await?,
            TransferMode::Copy => self.storage.copy_file(&source, &destination).await?,
        }

        info!(
            file = %file,
            from = %source,
            to = %destination,
            mode = ?self.options.transfer,
            "Relocated file"
        );

        Ok(match (replace, self.options.transfer) {
            (true, _) => RelocateOutcome::Overwritten,
            (false, TransferMode::Move) => RelocateOutcome::Moved,
            (false, TransferMode::Copy) => RelocateOutcome::Copied,
        })
    }

    async fn unlink_in(
        &self,
        upload: &ResolvedLocation,
        file: &FileRef,
    ) -> Result<UnlinkOutcome, StorageError> {
        let path = upload.join(file.as_str());
        if !self.storage.exists(&path).await? {
            debug!(file = %file, "Already absent");
            return Ok(UnlinkOutcome::Absent);
        }
        self.storage.delete(&path).await?;
        info!(file = %file, path = %path, "Deleted file");
        Ok(UnlinkOutcome::Deleted)
    }
}
