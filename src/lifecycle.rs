//! Record lifecycle adapter
//!
//! Connects a host's record events to the relocation engine:
//!
//! | Host event              | Call                          |
//! |-------------------------|-------------------------------|
//! | after insert committed  | [`AttachmentBinding::after_insert`]  |
//! | after update committed  | [`AttachmentBinding::after_update`]  |
//! | before delete           | [`AttachmentBinding::before_delete`] |
//!
//! The host captures the old snapshot of a record before updating it and
//! passes both snapshots explicitly. The binding never writes to a record.

use crate::engine::{RelocationEngine, RelocationOptions, RelocationReport};
use crate::error::StorageError;
use crate::location::Location;
use crate::storage::{join_path, Storage};
use crate::value::AttributeValue;
use std::sync::Arc;

/// A record with one or more upload attributes
pub trait UploadRecord {
    /// Current value of an upload attribute
    fn attribute_value(&self, attribute: &str) -> AttributeValue;

    /// Record-specific upload directory, used when the binding has none
    fn upload_dir(&self) -> Option<String> {
        None
    }

    /// Path segment appended to the public URL of stored files
    fn upload_path(&self) -> String {
        String::new()
    }

    /// Public URLs of the files an attribute references
    fn attribute_urls(&self, attribute: &str, base_url: &str) -> Vec<String> {
        let base = format!("{}{}", base_url.trim_end_matches('/'), self.upload_path());
        self.attribute_value(attribute)
            .refs()
            .into_iter()
            .map(|f| join_path(&base, f.as_str()))
            .collect()
    }
}

/// Binds one upload attribute of a record type to storage
pub struct AttachmentBinding<S: Storage + ?Sized> {
    attribute: String,
    storage: Arc<S>,
    temp_dir: Location,
    upload_dir: Option<Location>,
    options: RelocationOptions,
}

impl<S: Storage + ?Sized> AttachmentBinding<S> {
    pub fn new(
        storage: Arc<S>,
        attribute: impl Into<String>,
        temp_dir: impl Into<Location>,
    ) -> Result<Self, StorageError> {
        let attribute = attribute.into();
        if attribute.trim().is_empty() {
            return Err(StorageError::Config("attribute must be set".into()));
        }
        let temp_dir = temp_dir.into();
        temp_dir.validate("temp_dir")?;

        Ok(Self {
            attribute,
            storage,
            temp_dir,
            upload_dir: None,
            options: RelocationOptions::default(),
        })
    }

    /// Fixed or resolver-based upload directory for every record
    pub fn with_upload_dir(mut self, upload_dir: impl Into<Location>) -> Result<Self, StorageError> {
        let upload_dir = upload_dir.into();
        upload_dir.validate("upload_dir")?;
        self.upload_dir = Some(upload_dir);
        Ok(self)
    }

    pub fn with_options(mut self, options: RelocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    fn engine_for<R: UploadRecord>(&self, record: &R) -> Result<RelocationEngine<S>, StorageError> {
        let upload_dir = match (&self.upload_dir, record.upload_dir()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(dir)) => Location::Static(dir),
            (None, None) => {
                return Err(StorageError::Config(format!(
                    "no upload directory for attribute '{}'",
                    self.attribute
                )))
            }
        };

        Ok(
            RelocationEngine::new(Arc::clone(&self.storage), self.temp_dir.clone(), upload_dir)?
                .with_options(self.options),
        )
    }

    pub async fn after_insert<R: UploadRecord>(
        &self,
        record: &R,
    ) -> Result<RelocationReport, StorageError> {
        let engine = self.engine_for(record)?;
        engine.on_create(&record.attribute_value(&self.attribute)).await
    }

    /// `old` is the record as loaded before the update, `new` as saved
    pub async fn after_update<R: UploadRecord>(
        &self,
        old: &R,
        new: &R,
    ) -> Result<RelocationReport, StorageError> {
        let engine = self.engine_for(new)?;
        engine
            .on_update(
                &old.attribute_value(&self.attribute),
                &new.attribute_value(&self.attribute),
            )
            .await
    }

    pub async fn before_delete<R: UploadRecord>(
        &self,
        record: &R,
    ) -> Result<RelocationReport, StorageError> {
        let engine = self.engine_for(record)?;
        engine.on_delete(&record.attribute_value(&self.attribute)).await
    }
}
