//! Document layout of chats and messages in the store.
//!
//! ```text
//! chats/{chat_id}                      ChatDoc
//! chats/{chat_id}/messages/{msg_id}    MessageDoc
//! users/{user_id}/friendRequests/{id}  counted only
//! ```
//!
//! Timestamps are integer milliseconds since the Unix epoch.

use std::collections::HashMap;

use hearth_store_traits::{DocRef, Document, StoreError};
use serde::{Deserialize, Serialize};

use crate::state::{ChatMessage, MessageStatus, ParticipantInfo, UserProfile};

pub(crate) const CHATS: &str = "chats";

pub(crate) const PARTICIPANTS: &str = "participants";
pub(crate) const LAST_MESSAGE: &str = "lastMessage";
pub(crate) const LAST_MESSAGE_TIME: &str = "lastMessageTime";
pub(crate) const CREATED_AT: &str = "createdAt";
pub(crate) const READ: &str = "read";

pub(crate) const UNKNOWN_NAME: &str = "Unknown";

// Persisted status of a stored message; pending-ness comes from the snapshot.
const STORED_STATUS_SENT: &str = "sent";

pub(crate) fn chat_ref(chat_id: &str) -> DocRef {
    DocRef::new(CHATS, chat_id)
}

pub(crate) fn messages_collection(chat_id: &str) -> String {
    format!("{CHATS}/{chat_id}/messages")
}

pub(crate) fn friend_requests_collection(user_id: &str) -> String {
    format!("users/{user_id}/friendRequests")
}

/// Dotted path of one participant's unread counter.
pub(crate) fn unread_path(user_id: &str) -> String {
    format!("unreadCounts.{user_id}")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ParticipantDetails {
    pub(crate) username: Option<String>,
    pub(crate) display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub(crate) photo_url: Option<String>,
}

impl From<&UserProfile> for ParticipantDetails {
    fn from(user: &UserProfile) -> Self {
        Self {
            username: Some(user.username.clone()),
            display_name: Some(user.display_name.clone()),
            photo_url: user.photo_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ChatDoc {
    pub(crate) participants: Vec<String>,
    pub(crate) participant_details: HashMap<String, ParticipantDetails>,
    pub(crate) last_message: String,
    pub(crate) last_message_time: i64,
    pub(crate) unread_counts: HashMap<String, i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) created_at: Option<i64>,
}

impl ChatDoc {
    /// Fresh 1:1 chat with zeroed counters and an empty preview.
    pub(crate) fn new_between(me: &UserProfile, peer: &UserProfile, now_ms: i64) -> Self {
        Self {
            participants: vec![me.user_id.clone(), peer.user_id.clone()],
            participant_details: HashMap::from([
                (me.user_id.clone(), ParticipantDetails::from(me)),
                (peer.user_id.clone(), ParticipantDetails::from(peer)),
            ]),
            last_message: String::new(),
            last_message_time: now_ms,
            unread_counts: HashMap::from([(me.user_id.clone(), 0), (peer.user_id.clone(), 0)]),
            created_at: Some(now_ms),
        }
    }

    /// The participant that is not `me`. Falls back to the first participant
    /// for malformed chats.
    pub(crate) fn peer_of(&self, me: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.as_str() != me)
            .or_else(|| self.participants.first())
            .map(String::as_str)
    }

    pub(crate) fn peer_info(&self, me: &str) -> Option<ParticipantInfo> {
        let peer = self.peer_of(me)?;
        let details = self.participant_details.get(peer);
        Some(ParticipantInfo {
            user_id: peer.to_string(),
            name: details
                .and_then(|d| d.display_name.clone())
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            username: details.and_then(|d| d.username.clone()),
            avatar_url: details.and_then(|d| d.photo_url.clone()),
        })
    }

    /// Counters are non-negative by construction; clamp anything else.
    pub(crate) fn unread_for(&self, user_id: &str) -> u32 {
        self.unread_counts
            .get(user_id)
            .copied()
            .unwrap_or(0)
            .clamp(0, i64::from(u32::MAX)) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageDoc {
    pub(crate) chat_id: String,
    pub(crate) sender_id: String,
    #[serde(default)]
    pub(crate) sender_username: Option<String>,
    #[serde(default)]
    pub(crate) sender_display_name: String,
    #[serde(default, rename = "senderPhotoURL")]
    pub(crate) sender_photo_url: Option<String>,
    #[serde(default)]
    pub(crate) content: String,
    // Written as a server timestamp; never serialized from the client.
    #[serde(default, skip_serializing)]
    pub(crate) created_at: Option<i64>,
    #[serde(default)]
    pub(crate) read: bool,
    #[serde(default)]
    pub(crate) status: Option<String>,
}

impl MessageDoc {
    pub(crate) fn outgoing(chat_id: &str, author: &UserProfile, content: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            sender_id: author.user_id.clone(),
            sender_username: Some(author.username.clone()),
            sender_display_name: author.display_name.clone(),
            sender_photo_url: author.photo_url.clone(),
            content: content.to_string(),
            created_at: None,
            read: false,
            status: Some(STORED_STATUS_SENT.to_string()),
        }
    }

    pub(crate) fn into_chat_message(
        self,
        id: String,
        created_at: i64,
        my_id: &str,
        status: MessageStatus,
    ) -> ChatMessage {
        ChatMessage {
            is_mine: self.sender_id == my_id,
            id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            sender_name: if self.sender_display_name.trim().is_empty() {
                UNKNOWN_NAME.to_string()
            } else {
                self.sender_display_name
            },
            sender_username: self.sender_username,
            sender_avatar_url: self.sender_photo_url,
            content: self.content,
            created_at,
            read: self.read,
            status,
        }
    }
}

/// Decode one message document. Documents without a timestamp cannot be placed
/// in the window and are reported as `Ok(None)`.
pub(crate) fn decode_message(
    doc: &Document,
    my_id: &str,
) -> Result<Option<ChatMessage>, StoreError> {
    let stored: MessageDoc = doc.decode()?;
    let Some(created_at) = stored.created_at else {
        return Ok(None);
    };
    let status = if doc.has_pending_writes {
        MessageStatus::Pending
    } else {
        MessageStatus::Confirmed
    };
    Ok(Some(stored.into_chat_message(
        doc.id().to_string(),
        created_at,
        my_id,
        status,
    )))
}

/// Decode a batch, skipping (and logging) documents that do not fit the schema.
pub(crate) fn decode_messages(docs: &[Document], my_id: &str) -> Vec<ChatMessage> {
    docs.iter()
        .filter_map(|doc| match decode_message(doc, my_id) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(doc = %doc.reference, %e, "skipping undecodable message");
                None
            }
        })
        .collect()
}
