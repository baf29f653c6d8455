//! Conversation directory: the signed-in user's chats, newest activity first.

use hearth_store_traits::{Document, DocumentStore, Fields, ListenTarget, Query, SetOptions};

use super::schema::{self, ChatDoc, PARTICIPANTS};
use super::AppCore;
use crate::state::{ChatSummary, UserProfile};
use crate::updates::{CoreMsg, InternalEvent};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChatEntry {
    pub(crate) id: String,
    pub(crate) doc: ChatDoc,
}

#[derive(Debug, Default)]
pub(crate) struct Directory {
    entries: Vec<ChatEntry>,
    loaded: bool,
}

/// `lastMessageTime` descending, then chat id ascending.
fn sort_entries(entries: &mut [ChatEntry]) {
    entries.sort_by(|a, b| {
        b.doc
            .last_message_time
            .cmp(&a.doc.last_message_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn matches_search(entry: &ChatEntry, my_id: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    entry
        .doc
        .peer_info(my_id)
        .map(|p| p.name.to_lowercase().contains(needle))
        .unwrap_or(false)
}

impl Directory {
    pub(crate) fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn get(&self, chat_id: &str) -> Option<&ChatDoc> {
        self.entries.iter().find(|e| e.id == chat_id).map(|e| &e.doc)
    }

    /// Replace the whole set from a snapshot. Undecodable chats are skipped.
    pub(crate) fn apply_snapshot(&mut self, docs: &[Document]) {
        let mut entries: Vec<ChatEntry> = docs
            .iter()
            .filter_map(|d| match d.decode::<ChatDoc>() {
                Ok(doc) => Some(ChatEntry {
                    id: d.id().to_string(),
                    doc,
                }),
                Err(e) => {
                    tracing::warn!(chat = %d.reference, %e, "skipping undecodable chat");
                    None
                }
            })
            .collect();
        sort_entries(&mut entries);
        self.entries = entries;
        self.loaded = true;
    }

    /// Optimistic preview after a local send: the chat jumps to the top.
    pub(crate) fn apply_local_send(&mut self, chat_id: &str, preview: &str, at: i64) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == chat_id) else {
            return false;
        };
        let mut entry = self.entries.remove(pos);
        entry.doc.last_message = preview.to_string();
        entry.doc.last_message_time = at;
        self.entries.insert(0, entry);
        true
    }

    /// Show zero unread for `user_id` until the next snapshot says otherwise.
    pub(crate) fn zero_unread_locally(&mut self, chat_id: &str, user_id: &str) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == chat_id) else {
            return false;
        };
        let changed = entry.doc.unread_for(user_id) != 0;
        entry.doc.unread_counts.insert(user_id.to_string(), 0);
        changed
    }

    /// Visible rows for the chat list; the search only narrows by peer name.
    pub(crate) fn summaries(&self, my_id: &str, search: &str) -> Vec<ChatSummary> {
        let needle = search.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|e| matches_search(e, my_id, &needle))
            .map(|e| ChatSummary {
                chat_id: e.id.clone(),
                peer: e.doc.peer_info(my_id),
                last_message: e.doc.last_message.clone(),
                last_message_at: e.doc.last_message_time,
                unread_count: e.doc.unread_for(my_id),
            })
            .collect()
    }

    pub(crate) fn total_unread(&self, my_id: &str) -> u32 {
        self.entries
            .iter()
            .map(|e| e.doc.unread_for(my_id))
            .fold(0u32, u32::saturating_add)
    }
}

/// Find the chat shared by `me` and `peer`, creating it when there is none.
pub(crate) async fn find_or_create_chat(
    store: &dyn DocumentStore,
    me: &UserProfile,
    peer: &UserProfile,
    now_ms: i64,
) -> anyhow::Result<String> {
    use anyhow::Context;

    let mine = store
        .query(&Query::collection(schema::CHATS).where_array_contains(PARTICIPANTS, me.user_id.as_str()))
        .await
        .context("looking up existing chats")?;
    let existing = mine.docs.iter().find(|d| {
        d.decode::<ChatDoc>()
            .map(|c| c.participants.iter().any(|p| p == &peer.user_id))
            .unwrap_or(false)
    });
    if let Some(doc) = existing {
        return Ok(doc.id().to_string());
    }

    let chat = store.new_doc_ref(schema::CHATS);
    let fields = Fields::from_serialize(&ChatDoc::new_between(me, peer, now_ms))?;
    store
        .set(&chat, fields, SetOptions::Overwrite)
        .await
        .context("creating chat")?;
    tracing::info!(chat_id = %chat.id, peer = %peer.user_id, "chat created");
    Ok(chat.id)
}

impl AppCore {
    pub(super) fn start_chats_subscription(&mut self) {
        let Some(my_id) = self.my_id() else {
            return;
        };
        let token = self.next_token();
        let query = Query::collection(schema::CHATS).where_array_contains(PARTICIPANTS, my_id);
        let sub = self.subscribe(ListenTarget::Query(query), token, |token, r| {
            InternalEvent::ChatsSnapshot {
                token,
                result: r.map(|s| s.docs).map_err(|e| e.to_string()),
            }
        });
        if let Some(sess) = self.session.as_mut() {
            sess.chats_sub = Some(sub);
        }
    }

    pub(super) fn handle_chats_snapshot(&mut self, token: u64, result: Result<Vec<Document>, String>) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.chats_sub.as_ref().map(|s| s.token) != Some(token) {
            tracing::debug!(token, "dropping stale chats snapshot");
            return;
        }
        match result {
            Ok(docs) => {
                tracing::debug!(chats = docs.len(), "chats snapshot");
                sess.directory.apply_snapshot(&docs);
            }
            Err(e) => {
                // Surfaced once; the list keeps its last contents.
                tracing::warn!(%e, "chat listener failed");
                sess.chats_sub = None;
                self.state.busy.loading_chats = false;
                self.toast(format!("Could not load chats: {e}"));
                return;
            }
        }
        self.state.busy.loading_chats = false;
        self.rebuild_chat_list();
        self.observe_unread_total();
        if self.pager.is_some() {
            self.refresh_current_chat();
        }
        self.emit_state();
    }

    /// Recompute `state.chat_list` from the directory. The caller emits.
    pub(super) fn rebuild_chat_list(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            self.state.chat_list = vec![];
            return;
        };
        self.state.chat_list = sess
            .directory
            .summaries(&sess.user.user_id, &self.state.chat_search);
    }

    pub(super) fn start_chat(&mut self, peer: UserProfile) {
        let (me, session) = match self.session.as_ref() {
            Some(s) => (s.user.clone(), s.token),
            None => {
                self.toast("Please sign in first");
                return;
            }
        };
        if peer.user_id.trim().is_empty() {
            self.toast("Pick someone to message");
            return;
        }
        if peer.user_id == me.user_id {
            self.toast("You can't start a chat with yourself");
            return;
        }
        if self.state.busy.creating_chat {
            return;
        }

        self.set_busy(|b| b.creating_chat = true);
        let store = self.store.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let now = crate::state::now_millis();
            let result = find_or_create_chat(store.as_ref(), &me, &peer, now)
                .await
                .map_err(|e| format!("{e:#}"));
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ChatStarted {
                session,
                result,
            })));
        });
    }

    pub(super) fn handle_chat_started(&mut self, session: u64, result: Result<String, String>) {
        if self.session_token() != Some(session) {
            return;
        }
        self.state.busy.creating_chat = false;
        match result {
            Ok(chat_id) => {
                self.open_chat_screen(&chat_id);
                self.sync_current_chat_to_router();
                self.emit_state();
            }
            Err(e) => {
                tracing::warn!(%e, "start chat failed");
                self.toast(format!("Could not start chat: {e}"));
            }
        }
    }
}
