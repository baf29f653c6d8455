//! Message pager: a gap-free, ordered window over one conversation.
//!
//! The newest page comes from a live listener; older pages are fetched one at a
//! time when the reader reaches the top edge. The window is kept sorted by
//! `(created_at, id)` and never holds two entries with the same id.

use std::collections::{HashMap, HashSet};

use hearth_store_traits::{Direction, Document, ListenTarget, Query};

use super::schema::{self, CREATED_AT};
use super::{AppCore, Subscription};
use crate::state::{ChatMessage, ChatViewState, MessageStatus, PagerPhase, ScrollAnchor};
use crate::updates::{CoreMsg, InternalEvent};

const MAX_READ_RETRIES: u32 = 3;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MessageWindow {
    messages: Vec<ChatMessage>,
}

fn sort_key(m: &ChatMessage) -> (i64, &str) {
    (m.created_at, m.id.as_str())
}

impl MessageWindow {
    pub(crate) fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn first(&self) -> Option<&ChatMessage> {
        self.messages.first()
    }

    fn sort(&mut self) {
        self.messages.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    }

    /// Merge a live batch by id. Messages outside the batch stay: they are
    /// either older pages or optimistic sends the store has not echoed yet.
    pub(crate) fn merge_live(&mut self, batch: Vec<ChatMessage>) {
        let index: HashMap<String, usize> = self
            .messages
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
        for incoming in batch {
            match index.get(&incoming.id) {
                Some(&i) => {
                    let status = self.messages[i].status.merge(&incoming.status);
                    self.messages[i] = ChatMessage {
                        status,
                        ..incoming
                    };
                }
                None => self.messages.push(incoming),
            }
        }
        self.dedup_and_sort();
    }

    /// Prepend an older page. Returns how many messages were new to the window.
    pub(crate) fn prepend_older(&mut self, older: Vec<ChatMessage>) -> usize {
        let known: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
        let fresh: Vec<ChatMessage> = older
            .into_iter()
            .filter(|m| !known.contains(m.id.as_str()))
            .collect();
        let added = fresh.len();
        if added > 0 {
            self.messages.splice(0..0, fresh);
            self.dedup_and_sort();
        }
        added
    }

    /// Append an optimistic message at the tail. Its local timestamp is nudged
    /// past the current tail so the window stays ordered even when the local
    /// clock lags the store's.
    pub(crate) fn push_pending(&mut self, mut message: ChatMessage) {
        if let Some(last) = self.messages.last() {
            if message.created_at <= last.created_at {
                message.created_at = last.created_at + 1;
            }
        }
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message;
        } else {
            self.messages.push(message);
        }
        self.sort();
    }

    /// Mark a message confirmed, adopting the store-assigned timestamp.
    pub(crate) fn confirm(&mut self, id: &str, created_at: i64) -> bool {
        let Some(m) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        m.status = MessageStatus::Confirmed;
        m.created_at = created_at;
        self.sort();
        true
    }

    /// Drop a message from the window, returning it marked as failed.
    pub(crate) fn fail(&mut self, id: &str, reason: &str) -> Option<ChatMessage> {
        let pos = self.messages.iter().position(|m| m.id == id)?;
        let mut removed = self.messages.remove(pos);
        removed.status = MessageStatus::Failed {
            reason: reason.to_string(),
        };
        Some(removed)
    }

    /// Persisted messages from other senders not yet flagged as read.
    pub(crate) fn unread_from_others(&self, my_id: &str) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| !m.read && m.sender_id != my_id)
            .filter(|m| m.status == MessageStatus::Confirmed)
            .map(|m| m.id.clone())
            .collect()
    }

    fn dedup_and_sort(&mut self) {
        let mut seen = HashSet::new();
        // Later entries are fresher copies; keep the last occurrence of each id.
        let mut kept: Vec<ChatMessage> = self
            .messages
            .drain(..)
            .rev()
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        kept.reverse();
        self.messages = kept;
        self.sort();
    }
}

pub(crate) struct Pager {
    pub(crate) chat_id: String,
    pub(crate) token: u64,
    pub(crate) phase: PagerPhase,
    pub(crate) window: MessageWindow,
    pub(crate) can_load_older: bool,
    pub(crate) load_error: Option<String>,
    pub(crate) scroll_anchor: Option<ScrollAnchor>,
    anchor_seq: u64,
    // Ids whose read flag is already being written.
    marking_read: HashSet<String>,
    read_retries: u32,
    subscription: Option<Subscription>,
}

impl Pager {
    fn new(chat_id: &str, token: u64) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            token,
            phase: PagerPhase::Loading,
            window: MessageWindow::default(),
            can_load_older: true,
            load_error: None,
            scroll_anchor: None,
            anchor_seq: 0,
            marking_read: HashSet::new(),
            read_retries: 0,
            subscription: None,
        }
    }

    /// Unread messages from others not yet being flagged; claims them.
    fn claim_unread(&mut self, my_id: &str) -> Vec<String> {
        let unread: Vec<String> = self
            .window
            .unread_from_others(my_id)
            .into_iter()
            .filter(|id| !self.marking_read.contains(id))
            .collect();
        self.marking_read.extend(unread.iter().cloned());
        unread
    }

    fn newest_page_query(chat_id: &str, page_size: usize) -> Query {
        Query::collection(schema::messages_collection(chat_id))
            .order_by(CREATED_AT, Direction::Descending)
            .limit(page_size)
    }

    /// Page ending just before `(before, before_id)`, the oldest message held.
    fn older_page_query(chat_id: &str, before: i64, before_id: &str, page_size: usize) -> Query {
        Query::collection(schema::messages_collection(chat_id))
            .order_by(CREATED_AT, Direction::Descending)
            .start_after_doc(before, before_id)
            .limit(page_size)
    }
}

/// Store pages arrive newest first; the window wants oldest first.
fn ascending(docs: &[Document], my_id: &str) -> Vec<ChatMessage> {
    let mut messages = schema::decode_messages(docs, my_id);
    messages.reverse();
    messages
}

impl AppCore {
    pub(super) fn open_pager(&mut self, chat_id: &str) {
        // Detach the previous conversation before attaching the next one.
        self.close_pager();
        let Some(my_id) = self.my_id() else {
            return;
        };

        let token = self.next_token();
        let mut pager = Pager::new(chat_id, token);
        let query = Pager::newest_page_query(chat_id, self.config.page_size());
        pager.subscription = Some(self.subscribe(ListenTarget::Query(query), token, |token, r| {
            InternalEvent::MessagesSnapshot {
                token,
                result: r.map(|s| s.docs).map_err(|e| e.to_string()),
            }
        }));
        tracing::info!(%chat_id, token, "pager opened");
        self.pager = Some(pager);

        self.mark_chat_read(chat_id, &my_id, vec![]);
        self.refresh_current_chat();
    }

    pub(super) fn close_pager(&mut self) {
        if let Some(pager) = self.pager.take() {
            tracing::info!(chat_id = %pager.chat_id, token = pager.token, "pager closed");
        }
        if self.state.current_chat.is_some() {
            self.state.current_chat = None;
        }
    }

    /// Project the pager into `state.current_chat`. The caller emits.
    pub(super) fn refresh_current_chat(&mut self) {
        let Some(pager) = self.pager.as_ref() else {
            self.state.current_chat = None;
            return;
        };
        let peer = self.session.as_ref().and_then(|s| {
            s.directory
                .get(&pager.chat_id)
                .and_then(|chat| chat.peer_info(&s.user.user_id))
        });
        self.state.current_chat = Some(ChatViewState {
            chat_id: pager.chat_id.clone(),
            peer,
            phase: pager.phase,
            messages: pager.window.messages().to_vec(),
            can_load_older: pager.can_load_older,
            load_error: pager.load_error.clone(),
            scroll_anchor: pager.scroll_anchor.clone(),
        });
    }

    fn current_pager_mut(&mut self, token: u64) -> Option<&mut Pager> {
        self.pager.as_mut().filter(|p| p.token == token)
    }

    pub(super) fn handle_messages_snapshot(
        &mut self,
        token: u64,
        result: Result<Vec<Document>, String>,
    ) {
        let Some(my_id) = self.my_id() else {
            return;
        };
        let Some(pager) = self.current_pager_mut(token) else {
            tracing::debug!(token, "dropping stale messages snapshot");
            return;
        };

        let docs = match result {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(chat_id = %pager.chat_id, %e, "message listener failed");
                pager.load_error = Some(e.clone());
                // The listener is dead after an error; release it.
                pager.subscription = None;
                self.refresh_current_chat();
                self.toast(format!("Could not load messages: {e}"));
                return;
            }
        };

        tracing::debug!(chat_id = %pager.chat_id, docs = docs.len(), "messages snapshot");
        pager.window.merge_live(ascending(&docs, &my_id));
        pager.load_error = None;
        if pager.phase == PagerPhase::Loading {
            pager.phase = PagerPhase::Live;
        }

        let unread = pager.claim_unread(&my_id);
        let chat_id = pager.chat_id.clone();

        if !unread.is_empty() {
            self.mark_chat_read(&chat_id, &my_id, unread);
        }
        self.refresh_current_chat();
        self.emit_state();
    }

    /// Release read flags that failed to write so another pass picks them up.
    pub(super) fn handle_read_marked(&mut self, chat_id: &str, marked: usize, failed: Vec<String>) {
        if failed.is_empty() {
            tracing::debug!(%chat_id, marked, "read flags written");
            return;
        }
        tracing::warn!(%chat_id, marked, failed = failed.len(), "some read flags were not written");
        let Some(my_id) = self.my_id() else {
            return;
        };
        let Some(pager) = self.pager.as_mut().filter(|p| p.chat_id == chat_id) else {
            return;
        };
        for id in &failed {
            pager.marking_read.remove(id);
        }
        // Past the cap the next snapshot or reopen retries instead.
        if pager.read_retries >= MAX_READ_RETRIES {
            return;
        }
        pager.read_retries += 1;
        let retry = pager.claim_unread(&my_id);
        if !retry.is_empty() {
            self.mark_chat_read(chat_id, &my_id, retry);
        }
    }

    pub(super) fn load_older_messages(&mut self, chat_id: &str) {
        let page_size = self.config.page_size();
        let Some(pager) = self.pager.as_mut().filter(|p| p.chat_id == chat_id) else {
            return;
        };
        if pager.phase != PagerPhase::Live || !pager.can_load_older {
            return;
        }
        let Some((oldest, oldest_id)) = pager.window.first().map(|m| (m.created_at, m.id.clone()))
        else {
            return;
        };

        pager.phase = PagerPhase::LoadingOlder;
        let token = pager.token;
        let query = Pager::older_page_query(chat_id, oldest, &oldest_id, page_size);
        let store = self.store.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = store
                .query(&query)
                .await
                .map(|s| s.docs)
                .map_err(|e| e.to_string());
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::OlderMessagesLoaded {
                    token,
                    requested: page_size,
                    result,
                },
            )));
        });

        self.refresh_current_chat();
        self.emit_state();
    }

    pub(super) fn handle_older_messages(
        &mut self,
        token: u64,
        requested: usize,
        result: Result<Vec<Document>, String>,
    ) {
        let Some(my_id) = self.my_id() else {
            return;
        };
        let Some(pager) = self.current_pager_mut(token) else {
            tracing::debug!(token, "dropping stale older page");
            return;
        };
        pager.phase = PagerPhase::Live;

        let docs = match result {
            Ok(docs) => docs,
            Err(e) => {
                // Window and "more exists" stay as they were; the reader can retry.
                tracing::warn!(chat_id = %pager.chat_id, %e, "older page failed");
                self.refresh_current_chat();
                self.toast(format!("Could not load older messages: {e}"));
                return;
            }
        };

        if docs.len() < requested {
            pager.can_load_older = false;
        }
        let anchor = pager.window.first().map(|m| m.id.clone());
        let added = pager.window.prepend_older(ascending(&docs, &my_id));
        if let (Some(message_id), true) = (anchor, added > 0) {
            pager.anchor_seq += 1;
            pager.scroll_anchor = Some(ScrollAnchor {
                message_id,
                seq: pager.anchor_seq,
            });
        }
        tracing::debug!(
            chat_id = %pager.chat_id,
            fetched = docs.len(),
            added,
            can_load_older = pager.can_load_older,
            "older page merged"
        );
        self.refresh_current_chat();
        self.emit_state();
    }
}
