//! Configuration for upload-storage

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("upload-storage")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the local storage adapter
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Staging directory for fresh uploads, relative to the storage root
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,

    /// Permanent directory for files referenced by saved records
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Public URL prefix the storage root is served under
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// HTTP API port for the upload endpoint
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Move files out of temp (`false` copies them)
    #[serde(default = "default_true")]
    pub move_files: bool,

    /// Delete files replaced on update
    #[serde(default = "default_true")]
    pub unlink_old_file: bool,

    /// Delete files when their record is deleted
    #[serde(default = "default_true")]
    pub unlink_on_delete: bool,

    #[serde(default)]
    pub upload: UploadConfig,
}

/// Upload endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Form field carrying the file
    #[serde(default = "default_upload_param")]
    pub upload_param: String,

    /// Maximum upload size in bytes (0 = unlimited)
    #[serde(default = "default_max_size")]
    pub max_size_bytes: u64,

    /// Allowed extensions, lowercase without dot (empty = any)
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Allowed MIME types (empty = any)
    #[serde(default)]
    pub allowed_mime_types: Vec<String>,

    /// Accept only `image/*` uploads
    #[serde(default = "default_true")]
    pub only_images: bool,
}

fn default_temp_dir() -> String {
    "/temp".to_string()
}

fn default_upload_dir() -> String {
    "/upload".to_string()
}

fn default_public_url() -> String {
    "/storage".to_string()
}

fn default_http_port() -> u16 {
    8095
}

fn default_upload_param() -> String {
    "file".to_string()
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_param: default_upload_param(),
            max_size_bytes: default_max_size(),
            allowed_extensions: Vec::new(),
            allowed_mime_types: Vec::new(),
            only_images: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            temp_dir: default_temp_dir(),
            upload_dir: default_upload_dir(),
            public_url: default_public_url(),
            http_port: default_http_port(),
            move_files: true,
            unlink_old_file: true,
            unlink_on_delete: true,
            upload: UploadConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| StorageError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StorageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings no operation could run with
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.temp_dir.trim().is_empty() {
            return Err(StorageError::Config("temp_dir must be set".into()));
        }
        if self.upload_dir.trim().is_empty() {
            return Err(StorageError::Config("upload_dir must be set".into()));
        }
        if self.upload.upload_param.trim().is_empty() {
            return Err(StorageError::Config("upload.upload_param must be set".into()));
        }
        Ok(())
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    /// Public URL of the temp directory
    pub fn temp_url(&self) -> String {
        format!(
            "{}/{}",
            self.public_url.trim_end_matches('/'),
            self.temp_dir.trim_matches('/')
        )
    }
}
