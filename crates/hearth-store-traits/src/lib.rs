//! Hearth store - the document-store contract consumed by the messaging core.
//!
//! The core never talks to a concrete backend. It depends on [`DocumentStore`], which
//! captures what a managed document database with live queries offers:
//!
//! - point reads and filtered, ordered, paginated one-shot queries
//! - live listeners that push a new snapshot on every change
//! - `set` / `update` / `add` writes carrying write-time directives
//!   ([`FieldValue::Increment`], [`FieldValue::ServerTimestamp`])
//! - read-then-write transactions with optimistic concurrency
//!
//! Timestamps are stored as integer milliseconds since the Unix epoch.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;

pub mod document;
pub mod error;
pub mod listen;
pub mod query;
pub mod transaction;
pub mod write;

pub use self::document::{DocRef, Document};
pub use self::error::StoreError;
pub use self::listen::{ListenTarget, Listener, ListenerRegistration, QuerySnapshot};
pub use self::query::{Cursor, Direction, Filter, FilterOp, OrderBy, Query};
pub use self::transaction::{TransactionBody, TransactionView, MAX_TRANSACTION_ATTEMPTS};
pub use self::write::{FieldValue, Fields, SetOptions, Write, WriteResult};

/// Backend, reported in startup logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// In-process memory
    Memory,
}

/// Document store with live queries.
///
/// All methods are safe to call concurrently. Async methods resolve when the
/// backend acknowledges the operation; they never time out on their own.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Returns the backend type.
    fn backend(&self) -> Backend;

    /// Reserve a fresh document reference in `collection` without writing anything.
    ///
    /// Used to give an optimistic local copy the same identity as the document
    /// that will eventually be persisted.
    fn new_doc_ref(&self, collection: &str) -> DocRef;

    /// Attach a live listener. Setup failures are delivered as the first item of the
    /// returned listener rather than as an `Err` here.
    fn listen(&self, target: ListenTarget) -> Listener;

    /// Point read.
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError>;

    /// One-shot query.
    async fn query(&self, query: &Query) -> Result<QuerySnapshot, StoreError>;

    /// Create or replace (or merge into) a document.
    async fn set(
        &self,
        doc: &DocRef,
        fields: Fields,
        options: SetOptions,
    ) -> Result<WriteResult, StoreError>;

    /// Patch fields of an existing document by dotted path.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(&self, doc: &DocRef, fields: Fields) -> Result<WriteResult, StoreError>;

    /// Create a document with a store-generated id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<DocRef, StoreError>;

    /// Run `body` against a consistent read of `reads` and commit its writes atomically.
    ///
    /// If any document in `reads` changes before the commit, the body is re-run on a
    /// fresh view, up to [`MAX_TRANSACTION_ATTEMPTS`] times. Returns `Ok(None)` when the
    /// body chose to write nothing.
    async fn run_transaction(
        &self,
        reads: Vec<DocRef>,
        body: TransactionBody,
    ) -> Result<Option<WriteResult>, StoreError>;
}
