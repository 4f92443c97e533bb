//! Upload receiver
//!
//! Validates an incoming file, gives it a collision-free generated name and
//! writes it into the temp location. The relocation engine later moves it to
//! the upload location once a record referencing it is saved.

use crate::config::{Config, UploadConfig};
use crate::error::StorageError;
use crate::location::Location;
use crate::storage::Storage;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Attempts at finding an unused generated name
const MAX_NAME_ATTEMPTS: usize = 16;

type NameGenerator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// File as received from the client
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl IncomingFile {
    /// Lowercase extension of the original name, without the dot
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.original_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() || ext.contains('/') {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Checks applied before anything is written
#[derive(Debug, Clone, Default)]
pub struct UploadConstraints {
    /// 0 = unlimited
    pub max_size_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub allowed_mime_types: Vec<String>,
    pub only_images: bool,
}

impl From<&UploadConfig> for UploadConstraints {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_size_bytes: config.max_size_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            allowed_mime_types: config.allowed_mime_types.clone(),
            only_images: config.only_images,
        }
    }
}

impl UploadConstraints {
    pub fn check(&self, file: &IncomingFile) -> Result<(), StorageError> {
        if file.data.is_empty() {
            return Err(StorageError::Validation("Please upload a file.".into()));
        }

        if self.max_size_bytes > 0 && file.data.len() as u64 > self.max_size_bytes {
            return Err(StorageError::Validation(format!(
                "The file \"{}\" is too big. Its size cannot exceed {} bytes.",
                file.original_name, self.max_size_bytes
            )));
        }

        if !self.allowed_extensions.is_empty() {
            let allowed = file
                .extension()
                .map(|ext| self.allowed_extensions.contains(&ext))
                .unwrap_or(false);
            if !allowed {
                return Err(StorageError::Validation(format!(
                    "Only files with these extensions are allowed: {}.",
                    self.allowed_extensions.join(", ")
                )));
            }
        }

        if !self.allowed_mime_types.is_empty()
            && !self
                .allowed_mime_types
                .iter()
                .any(|m| m.eq_ignore_ascii_case(&file.mime_type))
        {
            return Err(StorageError::Validation(format!(
                "Only files with these MIME types are allowed: {}.",
                self.allowed_mime_types.join(", ")
            )));
        }

        if self.only_images && !file.mime_type.to_ascii_lowercase().starts_with("image/") {
            return Err(StorageError::Validation(format!(
                "The file \"{}\" is not an image.",
                file.original_name
            )));
        }

        Ok(())
    }
}

/// Metadata of a file stored in the temp location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub original_name: String,
    pub generated_name: String,
    pub extension: Option<String>,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Storage path inside the temp location
    pub temporary_path: String,
    pub url: String,
}

/// JSON body returned by the upload endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Success {
        name: String,
        original_name: String,
        extension: Option<String>,
        #[serde(rename = "type")]
        mime_type: String,
        size: u64,
        url: String,
    },
    Failure {
        error: String,
    },
}

impl UploadResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        UploadResponse::Failure {
            error: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadResponse::Success { .. })
    }
}

impl From<FileDescriptor> for UploadResponse {
    fn from(d: FileDescriptor) -> Self {
        UploadResponse::Success {
            name: d.generated_name,
            original_name: d.original_name,
            extension: d.extension,
            mime_type: d.mime_type,
            size: d.size_bytes,
            url: d.url,
        }
    }
}

impl From<Result<FileDescriptor, StorageError>> for UploadResponse {
    fn from(result: Result<FileDescriptor, StorageError>) -> Self {
        match result {
            Ok(descriptor) => descriptor.into(),
            Err(StorageError::Validation(message)) => UploadResponse::failure(message),
            Err(e) => {
                error!(error = %e, "Upload failed");
                UploadResponse::failure("Failed to load file")
            }
        }
    }
}

pub struct UploadReceiver<S: Storage + ?Sized> {
    storage: Arc<S>,
    temp_dir: Location,
    temp_url: String,
    name_generator: Option<NameGenerator>,
}

impl<S: Storage + ?Sized> UploadReceiver<S> {
    pub fn new(
        storage: Arc<S>,
        temp_dir: impl Into<Location>,
        temp_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let temp_dir = temp_dir.into();
        temp_dir.validate("temp_dir")?;
        Ok(Self {
            storage,
            temp_dir,
            temp_url: temp_url.into().trim_end_matches('/').to_string(),
            name_generator: None,
        })
    }

    pub fn from_config(storage: Arc<S>, config: &Config) -> Result<Self, StorageError> {
        Self::new(storage, config.temp_dir.as_str(), config.temp_url())
    }

    /// Custom name generator; receives the extension with its dot (or "").
    ///
    /// Generated names are used as-is, without a collision check.
    pub fn with_name_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.name_generator = Some(Arc::new(generator));
        self
    }

    /// Validate and store an upload in the temp location
    pub async fn receive(
        &self,
        file: IncomingFile,
        constraints: &UploadConstraints,
    ) -> Result<FileDescriptor, StorageError> {
        constraints.check(&file)?;

        let temp = self.temp_dir.resolve()?;
        let extension = file.extension();
        let suffix = extension
            .as_ref()
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let generated_name = match &self.name_generator {
            Some(generator) => generator(&suffix),
            None => self.unique_name(&temp.join(""), &suffix).await?,
        };
        let temporary_path = temp.join(&generated_name);

        self.storage.write(&temporary_path, &file.data).await?;

        info!(
            name = %generated_name,
            original = %file.original_name,
            size = file.data.len(),
            "Stored upload in temp"
        );

        Ok(FileDescriptor {
            url: format!("{}/{}", self.temp_url, generated_name),
            size_bytes: file.data.len() as u64,
            original_name: file.original_name,
            generated_name,
            extension,
            mime_type: file.mime_type,
            temporary_path,
        })
    }

    async fn unique_name(&self, temp_prefix: &str, suffix: &str) -> Result<String, StorageError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let candidate = format!("{}{}", uuid::Uuid::new_v4().simple(), suffix);
            let path = format!("{}{}", temp_prefix, candidate);
            if !self.storage.exists(&path).await? {
                return Ok(candidate);
            }
        }
        Err(StorageError::Internal(
            "could not generate a unique file name".into(),
        ))
    }
}
