//! Read-then-write transactions

use std::collections::HashMap;

use crate::{DocRef, Document, StoreError, Write};

/// Maximum number of attempts before a contended transaction is reported as
/// [`StoreError::Aborted`].
pub const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// Consistent view of the documents a transaction declared up front.
#[derive(Debug, Clone, Default)]
pub struct TransactionView {
    docs: HashMap<DocRef, Option<Document>>,
}

impl TransactionView {
    /// Build a view from the documents read at one instant.
    pub fn new(docs: HashMap<DocRef, Option<Document>>) -> Self {
        Self { docs }
    }

    /// Read a declared document. `Ok(None)` means it does not exist; reading a
    /// document that was not declared is an error.
    pub fn get(&self, doc: &DocRef) -> Result<Option<&Document>, StoreError> {
        match self.docs.get(doc) {
            Some(found) => Ok(found.as_ref()),
            None => Err(StoreError::InvalidArgument(format!(
                "{doc} was not declared as a transaction read"
            ))),
        }
    }
}

/// Transaction body: inspects the view and returns the writes to commit.
///
/// The body may run several times when the read set changes underneath it, so it
/// must be free of side effects. Returning no writes commits nothing.
pub type TransactionBody =
    Box<dyn Fn(&TransactionView) -> Result<Vec<Write>, StoreError> + Send + Sync + 'static>;
