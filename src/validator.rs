//! Existence validation for submitted file names
//!
//! Before a record is saved, every file name it references must exist in one
//! of the configured folders (usually the temp folder for new uploads and the
//! upload folder for files already stored).

use crate::error::StorageError;
use crate::location::Location;
use crate::storage::Storage;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_MESSAGE: &str = "File '{value}' must be loaded.";

/// One failed check, addressed like a form field (`gallery[1][file]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

pub struct ExistenceValidator<S: Storage + ?Sized> {
    storage: Arc<S>,
    folders: Vec<Location>,
    /// Key holding the file name when the attribute is a list of objects
    column: Option<String>,
    message: String,
}

impl<S: Storage + ?Sized> ExistenceValidator<S> {
    pub fn new(storage: Arc<S>, folders: Vec<Location>) -> Self {
        Self {
            storage,
            folders,
            column: None,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Validate a submitted attribute value
    pub async fn validate(
        &self,
        attribute: &str,
        value: &Value,
    ) -> Result<Vec<ValidationIssue>, StorageError> {
        let mut issues = Vec::new();

        match value {
            Value::String(name) if !name.is_empty() => {
                if !self.file_exists(name).await? {
                    issues.push(self.issue(attribute.to_string(), name));
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let (field, name) = match (item, &self.column) {
                        (Value::Object(map), Some(column)) => (
                            format!("{}[{}][{}]", attribute, index, column),
                            map.get(column).and_then(Value::as_str),
                        ),
                        (Value::String(s), _) => {
                            (format!("{}[{}]", attribute, index), Some(s.as_str()))
                        }
                        _ => continue,
                    };
                    let Some(name) = name.filter(|n| !n.is_empty()) else {
                        continue;
                    };
                    if !self.file_exists(name).await? {
                        issues.push(self.issue(field, name));
                    }
                }
            }
            _ => {}
        }

        Ok(issues)
    }

    /// Whether `name` exists in any configured folder
    pub async fn file_exists(&self, name: &str) -> Result<bool, StorageError> {
        for folder in &self.folders {
            let dir = folder.resolve()?;
            if self.storage.exists(&dir.join(name)).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn issue(&self, field: String, name: &str) -> ValidationIssue {
        ValidationIssue {
            field,
            message: self.message.replace("{value}", name),
        }
    }
}
