//! Upload Storage - staged uploads and file relocation
//!
//! Uploaded files land in a temp location first. When a record that
//! references them is saved, the relocation engine moves them into the
//! upload location and removes files the record no longer references.
//!
//! ## Flow
//!
//! ```text
//! client ──POST /upload──▶ UploadReceiver ──write──▶ temp/3f2c…e1.png
//!
//! record saved   ──▶ RelocationEngine::on_create  ──move──▶ upload/3f2c…e1.png
//! record updated ──▶ RelocationEngine::on_update  ──move new, delete dropped
//! record deleted ──▶ RelocationEngine::on_delete  ──delete──▶ (gone)
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/upload-storage/
//! ├── temp/                  # Fresh uploads, not yet referenced
//! ├── upload/                # Files referenced by saved records
//! └── config.toml            # Configuration
//! ```
//!
//! Every storage access goes through the [`Storage`] trait, so the engine runs
//! the same against [`LocalStorage`] and the in-memory [`MemoryStorage`].

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod location;
pub mod response;
pub mod storage;
pub mod upload;
pub mod validator;
pub mod value;

// Re-exports
pub use admin::{StorageAdmin, StorageCommand};
pub use config::{Config, UploadConfig};
pub use engine::{
    ExistingPolicy, RelocateOutcome, RelocationEngine, RelocationOptions, RelocationReport,
    TransferMode, UnlinkOutcome,
};
pub use error::{ErrorKind, StorageError};
pub use http::HttpServer;
pub use lifecycle::{AttachmentBinding, UploadRecord};
pub use location::{Location, ResolvedLocation};
pub use storage::{Entry, EntryKind, LocalStorage, MemoryStorage, Storage};
pub use upload::{FileDescriptor, IncomingFile, UploadConstraints, UploadReceiver};
pub use validator::{ExistenceValidator, ValidationIssue};
pub use value::{AttributeValue, FileRef, RelocationPlan};
