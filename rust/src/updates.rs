use hearth_store_traits::Document;

use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Results of async store work, delivered back to the actor thread.
///
/// Events carrying a `token` belong to one subscription or one pager session;
/// the actor drops them when the token is no longer current.
#[derive(Debug)]
pub enum InternalEvent {
    // Live subscriptions
    ChatsSnapshot {
        token: u64,
        result: Result<Vec<Document>, String>,
    },
    FriendRequestsSnapshot {
        token: u64,
        result: Result<usize, String>,
    },
    MessagesSnapshot {
        token: u64,
        result: Result<Vec<Document>, String>,
    },

    // One-shot results
    OlderMessagesLoaded {
        token: u64,
        requested: usize,
        result: Result<Vec<Document>, String>,
    },
    MessageWriteFinished {
        session: u64,
        chat_id: String,
        message_id: String,
        result: Result<i64, String>,
    },
    UnreadCleared {
        chat_id: String,
        result: Result<bool, String>,
    },
    ReadMarked {
        chat_id: String,
        marked: usize,
        failed: Vec<String>,
    },
    ChatStarted {
        session: u64,
        result: Result<String, String>,
    },
    AssistantReplied {
        token: u64,
        result: Result<String, String>,
    },
}
