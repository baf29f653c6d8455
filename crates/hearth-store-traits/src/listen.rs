//! Live listeners
//!
//! A listener delivers a fresh [`QuerySnapshot`] every time the result set of its
//! target changes. It stays registered for as long as its [`ListenerRegistration`]
//! is alive: dropping the registration (or the [`Listener`] holding it) detaches
//! the listener on every exit path.

use std::fmt;

use flume::Receiver;

use crate::{DocRef, Document, Query, StoreError};

/// What a listener watches.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenTarget {
    /// The result set of a query
    Query(Query),
    /// A single document; snapshots hold zero or one documents
    Document(DocRef),
}

impl ListenTarget {
    /// Collection the target lives in.
    pub fn collection(&self) -> &str {
        match self {
            Self::Query(q) => &q.collection,
            Self::Document(d) => &d.collection,
        }
    }
}

/// Result set of a query (or single document) at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    /// Documents in query order
    pub docs: Vec<Document>,
}

impl QuerySnapshot {
    /// Number of documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True when the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// True when any document carries unacknowledged local writes.
    pub fn has_pending_writes(&self) -> bool {
        self.docs.iter().any(|d| d.has_pending_writes)
    }
}

/// Teardown handle for a live listener.
///
/// Detaches exactly once, either via [`ListenerRegistration::remove`] or on drop.
pub struct ListenerRegistration {
    detach: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ListenerRegistration {
    /// Wrap a detach callback.
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Registration with nothing to detach (e.g. a listener that failed to attach).
    pub fn noop() -> Self {
        Self { detach: None }
    }

    /// Detach now.
    pub fn remove(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// A live listener: a stream of snapshots (or errors) plus its teardown handle.
///
/// After an `Err` item the listener is dead; the store will not send again.
#[derive(Debug)]
pub struct Listener {
    /// Snapshot stream
    pub snapshots: Receiver<Result<QuerySnapshot, StoreError>>,
    /// Detaches the listener when dropped
    pub registration: ListenerRegistration,
}

impl Listener {
    /// A listener whose only item is `err`, used to report setup failures through the
    /// same channel as runtime failures.
    pub fn failed(err: StoreError) -> Self {
        let (tx, rx) = flume::bounded(1);
        let _ = tx.send(Err(err));
        Self {
            snapshots: rx,
            registration: ListenerRegistration::noop(),
        }
    }
}
