//! Storage locations
//!
//! A location is either a fixed path or a resolver function evaluated when a
//! lifecycle operation starts (per-tenant or per-record folders, dated
//! folders). A resolved location is held for the rest of that operation and
//! never re-evaluated mid-operation.

use crate::error::StorageError;
use crate::storage::join_path;
use std::fmt;
use std::sync::Arc;

type Resolver = Arc<dyn Fn() -> String + Send + Sync>;

/// Configured temp or upload directory
#[derive(Clone)]
pub enum Location {
    Static(String),
    Resolved(Resolver),
}

impl Location {
    pub fn fixed(path: impl Into<String>) -> Self {
        Location::Static(path.into())
    }

    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Location::Resolved(Arc::new(f))
    }

    /// Check what can be checked before any operation runs.
    ///
    /// Static paths are validated here; resolver output is validated by
    /// [`Location::resolve`].
    pub fn validate(&self, name: &str) -> Result<(), StorageError> {
        match self {
            Location::Static(path) if path.trim().is_empty() => Err(StorageError::Config(
                format!("{} must not be empty", name),
            )),
            _ => Ok(()),
        }
    }

    /// Evaluate the location once
    pub fn resolve(&self) -> Result<ResolvedLocation, StorageError> {
        let raw = match self {
            Location::Static(path) => path.clone(),
            Location::Resolved(resolver) => resolver(),
        };
        ResolvedLocation::new(raw)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Static(path) => f.debug_tuple("Static").field(path).finish(),
            Location::Resolved(_) => f.write_str("Resolved(<fn>)"),
        }
    }
}

impl From<&str> for Location {
    fn from(path: &str) -> Self {
        Location::fixed(path)
    }
}

impl From<String> for Location {
    fn from(path: String) -> Self {
        Location::Static(path)
    }
}

/// A concrete directory for the duration of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation(String);

impl ResolvedLocation {
    fn new(raw: String) -> Result<Self, StorageError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StorageError::Config(format!("Invalid path: '{}'", raw)));
        }
        let dir = trimmed.trim_end_matches('/');
        // "/" stays the storage root
        Ok(Self(if dir.is_empty() { "/".to_string() } else { dir.to_string() }))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage path of a file inside this location
    pub fn join(&self, name: &str) -> String {
        join_path(&self.0, name)
    }
}

impl fmt::Display for ResolvedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
