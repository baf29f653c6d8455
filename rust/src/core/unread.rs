//! Unread counters.
//!
//! A counter only ever moves through two paths: the store's atomic increment
//! (one per sent message, see `send`) and the guarded clear below, which reads
//! the chat inside a transaction and writes zero only when the counter is
//! positive. A plain read-then-write would clobber increments that land
//! between the two steps.

use std::sync::Arc;

use hearth_store_traits::{
    DocRef, DocumentStore, Fields, StoreError, TransactionBody, Write, WriteResult,
};
use tokio::task::JoinSet;

use super::schema::{self, READ};
use super::AppCore;
use crate::updates::{CoreMsg, InternalEvent};

/// Transaction body that zeroes `user_id`'s counter on `chat` if it is positive.
pub(crate) fn clear_unread_body(chat: DocRef, user_id: &str) -> TransactionBody {
    let path = schema::unread_path(user_id);
    Box::new(move |view| {
        let Some(doc) = view.get(&chat)? else {
            return Ok(vec![]);
        };
        let current = doc.get(&path).and_then(|v| v.as_i64()).unwrap_or(0);
        if current <= 0 {
            return Ok(vec![]);
        }
        Ok(vec![Write::Update {
            doc: chat.clone(),
            fields: Fields::new().set(path.clone(), 0),
        }])
    })
}

/// Run the guarded clear. `Ok(None)` means there was nothing to clear.
pub(crate) async fn clear_unread(
    store: &dyn DocumentStore,
    chat_id: &str,
    user_id: &str,
) -> Result<Option<WriteResult>, StoreError> {
    let chat = schema::chat_ref(chat_id);
    store
        .run_transaction(vec![chat.clone()], clear_unread_body(chat, user_id))
        .await
}

/// Preview update plus the peer's `+1`, as one write on the chat document.
pub(crate) fn preview_and_increment(preview: &str, at: i64, peer_id: &str) -> Fields {
    Fields::new()
        .set(schema::LAST_MESSAGE, preview)
        .set(schema::LAST_MESSAGE_TIME, at)
        .increment(schema::unread_path(peer_id), 1)
}

/// Flag every message read, concurrently. Returns the written count and the
/// ids whose write failed.
pub(crate) async fn write_read_flags(
    store: &Arc<dyn DocumentStore>,
    chat_id: &str,
    message_ids: Vec<String>,
) -> (usize, Vec<String>) {
    let collection = schema::messages_collection(chat_id);
    let mut writes = JoinSet::new();
    for id in message_ids {
        let store = store.clone();
        let doc = DocRef::new(collection.as_str(), id.as_str());
        writes.spawn(async move {
            let result = store.update(&doc, Fields::new().set(READ, true)).await;
            if let Err(e) = &result {
                tracing::debug!(%doc, %e, "read flag write failed");
            }
            (id, result.is_ok())
        });
    }

    let mut marked = 0;
    let mut failed = Vec::new();
    while let Some(joined) = writes.join_next().await {
        match joined {
            Ok((_, true)) => marked += 1,
            Ok((id, false)) => failed.push(id),
            Err(e) => tracing::warn!(%e, "read flag task did not finish"),
        }
    }
    (marked, failed)
}

impl AppCore {
    /// Zero the chat's counter locally, flag `message_ids` as read, then run the
    /// guarded clear. Failures are logged and healed by the next pass.
    pub(super) fn mark_chat_read(&mut self, chat_id: &str, my_id: &str, message_ids: Vec<String>) {
        let changed = self
            .session
            .as_mut()
            .map(|s| s.directory.zero_unread_locally(chat_id, my_id))
            .unwrap_or(false);
        if changed {
            self.rebuild_chat_list();
            self.observe_unread_total();
        }

        let store = self.store.clone();
        let tx = self.core_sender.clone();
        let chat_id = chat_id.to_string();
        let my_id = my_id.to_string();
        self.runtime.spawn(async move {
            if !message_ids.is_empty() {
                let (marked, failed) = write_read_flags(&store, &chat_id, message_ids).await;
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ReadMarked {
                    chat_id: chat_id.clone(),
                    marked,
                    failed,
                })));
            }

            let result = clear_unread(store.as_ref(), &chat_id, &my_id)
                .await
                .map(|r| r.is_some())
                .map_err(|e| e.to_string());
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::UnreadCleared {
                chat_id,
                result,
            })));
        });
    }
}
