//! [`DocumentStore`] implementation for [`MemoryStore`]

use std::collections::HashMap;

use async_trait::async_trait;
use hearth_store_traits::{
    Backend, DocRef, Document, DocumentStore, Fields, ListenTarget, Listener, Query,
    QuerySnapshot, SetOptions, StoreError, TransactionBody, TransactionView, Write, WriteResult,
    MAX_TRANSACTION_ATTEMPTS,
};
use serde_json::{Map, Value};

use crate::apply::{apply_set, apply_update};
use crate::{listeners, MemoryStore, Operation};

type Compute<'a> =
    dyn Fn(Option<&Map<String, Value>>, i64) -> Result<Map<String, Value>, StoreError> + Send + Sync + 'a;

enum CommitAttempt {
    Committed(WriteResult),
    Conflict,
}

impl MemoryStore {
    /// Shared write path for `set`, `update` and `add`.
    async fn write_with(
        &self,
        op: Operation,
        doc: &DocRef,
        compute: &Compute<'_>,
    ) -> Result<WriteResult, StoreError> {
        let config = self.shared.config;
        let mut overlay = None;

        if !config.write_latency.is_zero() {
            if config.latency_compensation {
                let mut inner = self.shared.inner.write();
                let estimate = inner.estimate_clock();
                let base = inner.visible_data(doc);
                if let Ok(data) = compute(base.as_ref(), estimate) {
                    overlay = Some(inner.push_overlay(doc, data));
                    listeners::notify(&mut inner);
                }
            }
            tokio::time::sleep(config.write_latency).await;
        }

        let failure = self.take_failure(op);
        let mut inner = self.shared.inner.write();
        if let Some(write_id) = overlay {
            inner.remove_overlay(doc, write_id);
        }
        let result = match failure {
            Some(err) => Err(err),
            None => {
                let now = inner.tick();
                let existing = inner.committed(doc).map(|d| d.data.clone());
                compute(existing.as_ref(), now)
                    .map(|data| inner.commit(vec![(doc.clone(), data)], now))
            }
        };
        listeners::notify(&mut inner);
        result
    }

    /// One optimistic attempt: stage every write against the committed state and
    /// commit only if no read document changed since `versions` was taken.
    fn try_commit(
        &self,
        versions: &HashMap<DocRef, u64>,
        writes: &[Write],
    ) -> Result<CommitAttempt, StoreError> {
        let mut inner = self.shared.inner.write();
        if versions.iter().any(|(doc, v)| inner.version(doc) != *v) {
            return Ok(CommitAttempt::Conflict);
        }

        let now = inner.tick();
        let mut staged: Vec<(DocRef, Map<String, Value>)> = Vec::new();
        for write in writes {
            let current = staged
                .iter()
                .rev()
                .find(|(d, _)| d == write.doc())
                .map(|(_, data)| data.clone())
                .or_else(|| inner.committed(write.doc()).map(|d| d.data.clone()));
            let data = match write {
                Write::Set {
                    fields, options, ..
                } => apply_set(current.as_ref(), fields, *options, now),
                Write::Update { doc, fields } => match current {
                    Some(existing) => apply_update(&existing, fields, now),
                    None => return Err(StoreError::NotFound(doc.path())),
                },
            };
            staged.retain(|(d, _)| d != write.doc());
            staged.push((write.doc().clone(), data));
        }

        let result = inner.commit(staged, now);
        listeners::notify(&mut inner);
        Ok(CommitAttempt::Committed(result))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn new_doc_ref(&self, collection: &str) -> DocRef {
        DocRef::new(collection, Self::generate_id())
    }

    fn listen(&self, target: ListenTarget) -> Listener {
        if let Some(err) = self.take_failure(Operation::Listen) {
            return Listener::failed(err);
        }
        self.attach(target)
    }

    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        if let Some(err) = self.take_failure(Operation::Get) {
            return Err(err);
        }
        Ok(self.shared.inner.read().committed_document(doc))
    }

    async fn query(&self, query: &Query) -> Result<QuerySnapshot, StoreError> {
        if let Some(err) = self.take_failure(Operation::Query) {
            return Err(err);
        }
        let inner = self.shared.inner.read();
        Ok(QuerySnapshot {
            docs: query.evaluate(inner.committed_in(&query.collection)),
        })
    }

    async fn set(
        &self,
        doc: &DocRef,
        fields: Fields,
        options: SetOptions,
    ) -> Result<WriteResult, StoreError> {
        self.write_with(Operation::Set, doc, &|existing, now| {
            Ok(apply_set(existing, &fields, options, now))
        })
        .await
    }

    async fn update(&self, doc: &DocRef, fields: Fields) -> Result<WriteResult, StoreError> {
        self.write_with(Operation::Update, doc, &|existing, now| match existing {
            Some(data) => Ok(apply_update(data, &fields, now)),
            None => Err(StoreError::NotFound(doc.path())),
        })
        .await
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<DocRef, StoreError> {
        let doc = self.new_doc_ref(collection);
        self.write_with(Operation::Add, &doc, &|_, now| {
            Ok(apply_set(None, &fields, SetOptions::Overwrite, now))
        })
        .await?;
        Ok(doc)
    }

    async fn run_transaction(
        &self,
        reads: Vec<DocRef>,
        body: TransactionBody,
    ) -> Result<Option<WriteResult>, StoreError> {
        if let Some(err) = self.take_failure(Operation::Transaction) {
            return Err(err);
        }
        let latency = self.shared.config.write_latency;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let (view, versions) = {
                let inner = self.shared.inner.read();
                let mut docs = HashMap::new();
                let mut versions = HashMap::new();
                for doc in &reads {
                    docs.insert(doc.clone(), inner.committed_document(doc));
                    versions.insert(doc.clone(), inner.version(doc));
                }
                (TransactionView::new(docs), versions)
            };

            let writes = body(&view)?;
            if writes.is_empty() {
                return Ok(None);
            }
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            match self.try_commit(&versions, &writes)? {
                CommitAttempt::Committed(result) => return Ok(Some(result)),
                CommitAttempt::Conflict => {
                    tracing::debug!(attempt, "transaction read set changed, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }

        Err(StoreError::Aborted(format!(
            "transaction did not commit after {MAX_TRANSACTION_ATTEMPTS} attempts"
        )))
    }
}
