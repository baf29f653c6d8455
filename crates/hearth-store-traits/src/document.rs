//! Document references and materialized documents

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::StoreError;

/// Address of a single document: the collection path plus the document id.
///
/// Collection paths may be nested (`chats/{chat_id}/messages`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocRef {
    /// Collection path, without leading or trailing slashes
    pub collection: String,
    /// Document id within the collection
    pub id: String,
}

impl DocRef {
    /// Create a reference from a collection path and an id.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Full slash-separated path of the document.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as observed by a read, query or listener.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Where the document lives
    pub reference: DocRef,
    /// Field data; always a JSON object
    pub data: Map<String, Value>,
    /// True when the data includes local writes the backend has not acknowledged yet
    pub has_pending_writes: bool,
}

impl Document {
    /// Document id shortcut.
    pub fn id(&self) -> &str {
        &self.reference.id
    }

    /// Look up a field by dotted path (`unreadCounts.uid`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.data, path)
    }

    /// Deserialize the document data into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            StoreError::Serialization(format!("{}: {e}", self.reference.path()))
        })
    }
}

/// Resolve a dotted field path inside a JSON object.
pub fn get_path<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut cur = data.get(first)?;
    for seg in segments {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

/// Mutable slot for a dotted field path, creating intermediate maps as needed.
///
/// Non-object intermediates are replaced by empty maps, mirroring how document
/// stores treat a dotted update that crosses a scalar field.
pub fn get_path_mut<'a>(data: &'a mut Map<String, Value>, path: &str) -> &'a mut Value {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };
    let mut cur = data;
    for seg in parents.into_iter().flat_map(|p| p.split('.')) {
        let entry = cur
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        cur = match entry {
            Value::Object(m) => m,
            _ => unreachable!("entry was just made an object"),
        };
    }
    cur.entry(leaf.to_string()).or_insert(Value::Null)
}

/// Remove a dotted field path; missing paths are ignored.
pub fn remove_path(data: &mut Map<String, Value>, path: &str) {
    match path.rsplit_once('.') {
        None => {
            data.remove(path);
        }
        Some((parent, leaf)) => {
            let mut cur = data;
            for seg in parent.split('.') {
                match cur.get_mut(seg) {
                    Some(Value::Object(m)) => cur = m,
                    _ => return,
                }
            }
            cur.remove(leaf);
        }
    }
}
