//! Write payloads and write-time directives

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{DocRef, StoreError};

/// Value of a single field in a write.
///
/// Besides plain JSON values, a write may carry directives the store resolves at
/// commit time, which keeps them safe under concurrent writers.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Store this value verbatim
    Value(Value),
    /// Add `n` to the stored number (missing or non-numeric fields count as 0)
    Increment(i64),
    /// Replace with the store's clock (milliseconds since the Unix epoch) at commit
    ServerTimestamp,
    /// Remove the field
    Delete,
}

/// An ordered set of field writes keyed by field path.
///
/// For [`DocumentStore::update`](crate::DocumentStore::update) keys are dotted paths
/// (`unreadCounts.uid`); for `set` they are top-level field names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    /// Empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any serializable struct that serializes to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(StoreError::InvalidArgument(format!(
                "document data must be an object, got {other}"
            ))),
        }
    }

    /// Build from a JSON object, one plain value per top-level key.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(
            map.into_iter()
                .map(|(k, v)| (k, FieldValue::Value(v)))
                .collect(),
        )
    }

    /// Set `path` to a plain value.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(path.into(), FieldValue::Value(value.into()));
        self
    }

    /// Atomically add `by` to `path`.
    pub fn increment(mut self, path: impl Into<String>, by: i64) -> Self {
        self.0.insert(path.into(), FieldValue::Increment(by));
        self
    }

    /// Resolve `path` to the store's commit time.
    pub fn server_timestamp(mut self, path: impl Into<String>) -> Self {
        self.0.insert(path.into(), FieldValue::ServerTimestamp);
        self
    }

    /// Remove `path`.
    pub fn delete(mut self, path: impl Into<String>) -> Self {
        self.0.insert(path.into(), FieldValue::Delete);
        self
    }

    /// Iterate `(path, value)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Look up the write for one path.
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.0.get(path)
    }

    /// Number of field writes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing would be written.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How `set` treats fields that are not part of the write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetOptions {
    /// Replace the whole document
    #[default]
    Overwrite,
    /// Deep-merge into the existing document, creating it if missing
    Merge,
}

/// A single write inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or replace (or merge into) a document
    Set {
        /// Target document
        doc: DocRef,
        /// Field values
        fields: Fields,
        /// Overwrite or merge
        options: SetOptions,
    },
    /// Patch an existing document by dotted path; fails if it does not exist
    Update {
        /// Target document
        doc: DocRef,
        /// Field writes
        fields: Fields,
    },
}

impl Write {
    /// Document this write targets.
    pub fn doc(&self) -> &DocRef {
        match self {
            Self::Set { doc, .. } | Self::Update { doc, .. } => doc,
        }
    }
}

/// Acknowledgement of a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WriteResult {
    /// Store-wide commit sequence; later commits compare greater
    pub commit_seq: u64,
    /// Commit time in milliseconds since the Unix epoch
    pub commit_time: i64,
}
