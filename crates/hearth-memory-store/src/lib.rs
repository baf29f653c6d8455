//! Memory-based document store for Hearth.
//!
//! This crate provides an in-process implementation of the
//! [`DocumentStore`](hearth_store_traits::DocumentStore) trait. It is non-persistent
//! and is meant for tests, offline demos and local development.
//!
//! Beyond plain storage it reproduces the behaviors the messaging core relies on:
//!
//! - live listeners that receive a snapshot on attach and on every change
//! - optimistic-concurrency transactions that re-run on contention
//! - commit-time directives (`increment`, `serverTimestamp`) with a strictly
//!   monotonic server clock
//! - optional write latency, with latency-compensated local echoes flagged as
//!   `has_pending_writes` while a write is in flight
//! - one-shot failure injection per operation
//!
//! ## Configuring latency
//!
//! ```rust
//! use std::time::Duration;
//! use hearth_memory_store::{MemoryStore, MemoryStoreConfig};
//!
//! let config = MemoryStoreConfig::default()
//!     .with_write_latency(Duration::from_millis(50))
//!     .with_latency_compensation(true);
//!
//! let store = MemoryStore::with_config(config);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use hearth_store_traits::{
    DocRef, Document, Fields, ListenTarget, Listener, ListenerRegistration, QuerySnapshot,
    SetOptions, StoreError, WriteResult,
};
use parking_lot::{Mutex, RwLock};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};

mod apply;
mod listeners;
mod store;

/// Length of store-generated document ids.
pub const AUTO_ID_LENGTH: usize = 20;

/// Store operations that can be made to fail with [`MemoryStore::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Point read
    Get,
    /// One-shot query
    Query,
    /// Listener attach
    Listen,
    /// `set`
    Set,
    /// `update`
    Update,
    /// `add`
    Add,
    /// `run_transaction`
    Transaction,
}

/// Tunables for [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStoreConfig {
    /// Delay before a write (or transaction commit) is applied
    pub write_latency: Duration,
    /// Show in-flight writes to listeners immediately, flagged as pending
    pub latency_compensation: bool,
}

impl MemoryStoreConfig {
    /// Creates a new `MemoryStoreConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay applied to every write.
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    /// Enables or disables latency-compensated local echoes.
    pub fn with_latency_compensation(mut self, enabled: bool) -> Self {
        self.latency_compensation = enabled;
        self
    }
}

#[derive(Debug, Clone)]
struct StoredDoc {
    data: Map<String, Value>,
    version: u64,
}

#[derive(Debug, Clone)]
struct Overlay {
    write_id: u64,
    data: Map<String, Value>,
}

struct ListenerEntry {
    target: ListenTarget,
    tx: flume::Sender<Result<QuerySnapshot, StoreError>>,
    last: Option<QuerySnapshot>,
}

#[derive(Default)]
struct Inner {
    // collection path -> id -> document
    collections: HashMap<String, BTreeMap<String, StoredDoc>>,
    // in-flight local writes, oldest first
    overlays: HashMap<DocRef, Vec<Overlay>>,
    listeners: HashMap<u64, ListenerEntry>,
    next_listener_id: u64,
    next_write_id: u64,
    commit_seq: u64,
    last_clock_ms: i64,
}

impl Inner {
    /// Advance the server clock; strictly increasing across commits.
    fn tick(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let t = now.max(self.last_clock_ms + 1);
        self.last_clock_ms = t;
        t
    }

    /// Local estimate of the next server time, without advancing the clock.
    fn estimate_clock(&self) -> i64 {
        chrono::Utc::now()
            .timestamp_millis()
            .max(self.last_clock_ms + 1)
    }

    fn committed(&self, doc: &DocRef) -> Option<&StoredDoc> {
        self.collections.get(&doc.collection)?.get(&doc.id)
    }

    fn committed_document(&self, doc: &DocRef) -> Option<Document> {
        self.committed(doc).map(|stored| Document {
            reference: doc.clone(),
            data: stored.data.clone(),
            has_pending_writes: false,
        })
    }

    fn version(&self, doc: &DocRef) -> u64 {
        self.committed(doc).map(|d| d.version).unwrap_or(0)
    }

    /// Data as a local client would see it: last pending overlay, else committed.
    fn visible_data(&self, doc: &DocRef) -> Option<Map<String, Value>> {
        if let Some(o) = self.overlays.get(doc).and_then(|v| v.last()) {
            return Some(o.data.clone());
        }
        self.committed(doc).map(|d| d.data.clone())
    }

    fn committed_in(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, stored)| Document {
                        reference: DocRef::new(collection, id.clone()),
                        data: stored.data.clone(),
                        has_pending_writes: false,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn visible_in(&self, collection: &str) -> Vec<Document> {
        let mut by_id: BTreeMap<String, Document> = self
            .committed_in(collection)
            .into_iter()
            .map(|d| (d.reference.id.clone(), d))
            .collect();
        for (doc, overlays) in &self.overlays {
            if doc.collection != collection {
                continue;
            }
            if let Some(o) = overlays.last() {
                by_id.insert(
                    doc.id.clone(),
                    Document {
                        reference: doc.clone(),
                        data: o.data.clone(),
                        has_pending_writes: true,
                    },
                );
            }
        }
        by_id.into_values().collect()
    }

    fn push_overlay(&mut self, doc: &DocRef, data: Map<String, Value>) -> u64 {
        self.next_write_id += 1;
        let write_id = self.next_write_id;
        self.overlays
            .entry(doc.clone())
            .or_default()
            .push(Overlay { write_id, data });
        write_id
    }

    fn remove_overlay(&mut self, doc: &DocRef, write_id: u64) {
        if let Some(list) = self.overlays.get_mut(doc) {
            list.retain(|o| o.write_id != write_id);
            if list.is_empty() {
                self.overlays.remove(doc);
            }
        }
    }

    /// Apply fully-resolved document data as one commit.
    fn commit(&mut self, writes: Vec<(DocRef, Map<String, Value>)>, now_ms: i64) -> WriteResult {
        self.commit_seq += 1;
        let seq = self.commit_seq;
        for (doc, data) in writes {
            self.collections.entry(doc.collection).or_default().insert(
                doc.id,
                StoredDoc {
                    data,
                    version: seq,
                },
            );
        }
        WriteResult {
            commit_seq: seq,
            commit_time: now_ms,
        }
    }
}

struct Shared {
    inner: RwLock<Inner>,
    config: MemoryStoreConfig,
    failures: Mutex<HashMap<Operation, VecDeque<StoreError>>>,
}

/// An in-memory [`DocumentStore`](hearth_store_traits::DocumentStore).
///
/// Cloning is cheap and every clone shares the same data, which lets a test hold
/// one handle while the core under test holds another.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.read();
        f.debug_struct("MemoryStore")
            .field("config", &self.shared.config)
            .field("collections", &inner.collections.len())
            .field("listeners", &inner.listeners.len())
            .field("commit_seq", &inner.commit_seq)
            .finish()
    }
}

impl MemoryStore {
    /// Store with no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with custom tunables.
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: RwLock::new(Inner::default()),
                config,
                failures: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Make the next call of `op` fail with `err`. Calls queue up in FIFO order.
    pub fn fail_next(&self, op: Operation, err: StoreError) {
        self.shared
            .failures
            .lock()
            .entry(op)
            .or_default()
            .push_back(err);
    }

    fn take_failure(&self, op: Operation) -> Option<StoreError> {
        self.shared.failures.lock().get_mut(&op)?.pop_front()
    }

    /// Commit a document immediately, bypassing latency and failure injection.
    ///
    /// Meant for seeding fixtures and for simulating writes from other clients.
    pub fn seed(&self, doc: &DocRef, data: Value) -> Result<WriteResult, StoreError> {
        let Value::Object(map) = data else {
            return Err(StoreError::InvalidArgument(format!(
                "{doc}: document data must be an object"
            )));
        };
        self.commit_now(doc, |_, now| {
            Ok(apply::apply_set(
                None,
                &Fields::from_map(map.clone()),
                SetOptions::Overwrite,
                now,
            ))
        })
    }

    /// Apply an `update` immediately, bypassing latency and failure injection.
    pub fn apply_remote_update(
        &self,
        doc: &DocRef,
        fields: Fields,
    ) -> Result<WriteResult, StoreError> {
        self.commit_now(doc, |existing, now| match existing {
            Some(data) => Ok(apply::apply_update(data, &fields, now)),
            None => Err(StoreError::NotFound(doc.path())),
        })
    }

    fn commit_now(
        &self,
        doc: &DocRef,
        compute: impl Fn(Option<&Map<String, Value>>, i64) -> Result<Map<String, Value>, StoreError>,
    ) -> Result<WriteResult, StoreError> {
        let mut inner = self.shared.inner.write();
        let now = inner.tick();
        let data = compute(inner.committed(doc).map(|d| &d.data), now)?;
        let result = inner.commit(vec![(doc.clone(), data)], now);
        listeners::notify(&mut inner);
        Ok(result)
    }

    /// Committed data of one document, if it exists.
    pub fn peek(&self, doc: &DocRef) -> Option<Value> {
        self.shared
            .inner
            .read()
            .committed(doc)
            .map(|d| Value::Object(d.data.clone()))
    }

    /// Number of committed documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.shared
            .inner
            .read()
            .collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.inner.read().listeners.len()
    }

    /// Fail every listener watching `collection` with `err` and detach them.
    pub fn break_listeners(&self, collection: &str, err: StoreError) {
        let mut inner = self.shared.inner.write();
        let ids: Vec<u64> = inner
            .listeners
            .iter()
            .filter(|(_, l)| l.target.collection() == collection)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(entry) = inner.listeners.remove(&id) {
                let _ = entry.tx.send(Err(err.clone()));
            }
        }
    }

    fn generate_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(AUTO_ID_LENGTH)
            .map(char::from)
            .collect()
    }

    fn attach(&self, target: ListenTarget) -> Listener {
        let (tx, rx) = flume::unbounded();
        let id = {
            let mut inner = self.shared.inner.write();
            inner.next_listener_id += 1;
            let id = inner.next_listener_id;
            inner.listeners.insert(
                id,
                ListenerEntry {
                    target,
                    tx,
                    last: None,
                },
            );
            listeners::notify(&mut inner);
            id
        };
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        Listener {
            snapshots: rx,
            registration: ListenerRegistration::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.inner.write().listeners.remove(&id);
                }
            }),
        }
    }
}
