// Send pipeline: optimistic local message, then the store writes.

use hearth_store_traits::{DocRef, DocumentStore, Fields, SetOptions};

use super::schema::{self, ChatDoc, MessageDoc, CREATED_AT};
use super::unread::preview_and_increment;
use super::AppCore;
use crate::state::{now_millis, MessageStatus};
use crate::updates::{CoreMsg, InternalEvent};

impl AppCore {
    pub(super) fn send_message(&mut self, chat_id: &str, content: &str) {
        let Some(sess) = self.session.as_ref() else {
            self.toast("Please sign in first");
            return;
        };
        let content = content.trim().to_string();
        if content.is_empty() {
            return;
        }
        let author = sess.user.clone();
        let session = sess.token;
        // Before the first chats snapshot the directory is empty; the write
        // task then reads the chat itself.
        let known_peer = sess
            .directory
            .get(chat_id)
            .and_then(|c| c.peer_of(&author.user_id))
            .map(str::to_string);

        // Same id for the optimistic copy and the stored document.
        let message_ref = self.store.new_doc_ref(&schema::messages_collection(chat_id));
        let message_id = message_ref.id.clone();
        let local_ts = now_millis();
        let stored = MessageDoc::outgoing(chat_id, &author, &content);
        let fields = match Fields::from_serialize(&stored) {
            Ok(f) => f.server_timestamp(CREATED_AT),
            Err(e) => {
                tracing::error!(%chat_id, %e, "could not encode message");
                self.toast(format!("Failed to send message: {e}"));
                return;
            }
        };

        if let Some(pager) = self.pager.as_mut().filter(|p| p.chat_id == chat_id) {
            pager.window.push_pending(stored.clone().into_chat_message(
                message_id.clone(),
                local_ts,
                &author.user_id,
                MessageStatus::Pending,
            ));
        }
        if let Some(sess) = self.session.as_mut() {
            sess.directory.apply_local_send(chat_id, &content, local_ts);
            sess.notifications.send_started();
        }
        self.rebuild_chat_list();
        self.refresh_current_chat();
        self.refresh_sending_flag();
        self.emit_state();

        tracing::info!(%chat_id, %message_id, "send started");
        let store = self.store.clone();
        let tx = self.core_sender.clone();
        let chat_ref = schema::chat_ref(chat_id);
        let chat_id = chat_id.to_string();
        let my_id = author.user_id;
        self.runtime.spawn(async move {
            let peer_id = match known_peer {
                Some(peer_id) => Ok(peer_id),
                None => resolve_peer(store.as_ref(), &chat_ref, &my_id).await,
            };
            let peer_id = match peer_id {
                Ok(peer_id) => peer_id,
                Err(e) => {
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::MessageWriteFinished {
                            session,
                            chat_id,
                            message_id,
                            result: Err(e),
                        },
                    )));
                    return;
                }
            };
            let preview = preview_and_increment(&content, local_ts, &peer_id);
            let (message, chat) = tokio::join!(
                store.set(&message_ref, fields, SetOptions::Overwrite),
                store.update(&chat_ref, preview),
            );
            if let Err(e) = &chat {
                // Not rolled back either way; the next send rewrites the preview.
                tracing::warn!(%chat_id, %e, "chat preview update failed");
            }
            let result = match (message, chat) {
                (Ok(written), Ok(_)) => Ok(written.commit_time),
                (Err(e), _) | (_, Err(e)) => Err(e.to_string()),
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::MessageWriteFinished {
                    session,
                    chat_id,
                    message_id,
                    result,
                },
            )));
        });
    }

    pub(super) fn handle_message_write_finished(
        &mut self,
        session: u64,
        chat_id: &str,
        message_id: &str,
        result: Result<i64, String>,
    ) {
        if self.session_token() != Some(session) {
            return;
        }
        if let Some(sess) = self.session.as_mut() {
            sess.notifications.send_finished();
        }
        self.refresh_sending_flag();

        let pager = self.pager.as_mut().filter(|p| p.chat_id == chat_id);
        match result {
            Ok(created_at) => {
                tracing::info!(%chat_id, %message_id, "send confirmed");
                if let Some(pager) = pager {
                    pager.window.confirm(message_id, created_at);
                }
                self.refresh_current_chat();
                self.emit_state();
            }
            Err(e) => {
                tracing::warn!(%chat_id, %message_id, %e, "send failed, rolling back");
                if let Some(pager) = pager {
                    pager.window.fail(message_id, &e);
                }
                self.refresh_current_chat();
                self.toast(format!("Failed to send message: {e}"));
            }
        }
    }
}

async fn resolve_peer(
    store: &dyn DocumentStore,
    chat_ref: &DocRef,
    my_id: &str,
) -> Result<String, String> {
    let doc = store
        .get(chat_ref)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "Chat not found".to_string())?;
    let chat: ChatDoc = doc.decode().map_err(|e| e.to_string())?;
    chat.peer_of(my_id)
        .map(str::to_string)
        .ok_or_else(|| "Chat not found".to_string())
}
