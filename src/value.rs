//! File references and attribute values
//!
//! A record attribute holds nothing, one file name, or a list of file names.
//! Everything downstream works on the normalized list form.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Name of one stored file, optionally with a subpath (`2024/05/a.jpg`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FileRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Value of an upload attribute
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    #[default]
    Empty,
    Single(FileRef),
    Multi(Vec<FileRef>),
}

impl AttributeValue {
    pub fn single(name: impl Into<FileRef>) -> Self {
        AttributeValue::Single(name.into())
    }

    pub fn multi<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FileRef>,
    {
        AttributeValue::Multi(names.into_iter().map(Into::into).collect())
    }

    /// Build from a JSON value.
    ///
    /// Accepts `null`, a string, an array of strings, or an array of objects
    /// whose `column` key holds the file name.
    pub fn from_json(value: &serde_json::Value, column: Option<&str>) -> Self {
        use serde_json::Value;

        match value {
            Value::String(s) => AttributeValue::Single(FileRef::new(s.clone())),
            Value::Array(items) => AttributeValue::Multi(
                items
                    .iter()
                    .filter_map(|item| match (item, column) {
                        (Value::String(s), _) => Some(FileRef::new(s.clone())),
                        (Value::Object(map), Some(col)) => {
                            map.get(col).and_then(|v| v.as_str()).map(FileRef::from)
                        }
                        _ => None,
                    })
                    .collect(),
            ),
            _ => AttributeValue::Empty,
        }
    }

    /// Normalized list form, empty names dropped, positions kept
    pub fn refs(&self) -> Vec<&FileRef> {
        match self {
            AttributeValue::Empty => Vec::new(),
            AttributeValue::Single(f) => {
                if f.is_empty() {
                    Vec::new()
                } else {
                    vec![f]
                }
            }
            AttributeValue::Multi(list) => list.iter().filter(|f| !f.is_empty()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.refs().is_empty()
    }
}

impl From<Option<String>> for AttributeValue {
    fn from(value: Option<String>) -> Self {
        value.map(|s| AttributeValue::Single(s.into())).unwrap_or_default()
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::single(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::multi(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        AttributeValue::multi(value)
    }
}

/// Files to move into permanent storage and files to remove from it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationPlan {
    pub create: Vec<FileRef>,
    pub delete: Vec<FileRef>,
}

impl RelocationPlan {
    /// `create = new - old`, `delete = old - new`; the intersection is untouched
    pub fn diff(old: &AttributeValue, new: &AttributeValue) -> Self {
        let old_refs = old.refs();
        let new_refs = new.refs();
        let old_set: HashSet<&FileRef> = old_refs.iter().copied().collect();
        let new_set: HashSet<&FileRef> = new_refs.iter().copied().collect();

        Self {
            create: new_refs
                .into_iter()
                .filter(|f| !old_set.contains(f))
                .cloned()
                .collect(),
            delete: old_refs
                .into_iter()
                .filter(|f| !new_set.contains(f))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}
