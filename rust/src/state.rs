#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub router: Router,
    pub auth: AuthState,
    pub busy: BusyState,
    pub chat_list: Vec<ChatSummary>,
    pub chat_search: String,
    pub current_chat: Option<ChatViewState>,
    pub notifications: NotificationState,
    pub assistant: AssistantState,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            router: Router {
                default_screen: Screen::SignIn,
                screen_stack: vec![],
            },
            auth: AuthState::SignedOut,
            busy: BusyState::idle(),
            chat_list: vec![],
            chat_search: String::new(),
            current_chat: None,
            notifications: NotificationState::empty(),
            assistant: AssistantState::empty(),
            toast: None,
        }
    }
}

/// "In flight" flags for long-ish operations that the UI should reflect.
///
/// Ephemeral UI state (scroll position, focus) stays native, but UX-relevant
/// async operation state lives in Rust so the UI never guesses.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_chats: bool,
    pub creating_chat: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_chats: false,
            creating_chat: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct Router {
    pub default_screen: Screen,
    pub screen_stack: Vec<Screen>,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum Screen {
    SignIn,
    Home,
    Messages,
    Chat { chat_id: String },
    Assistant,
}

/// Identity handed over by the auth layer. Authentication itself happens outside
/// the core.
#[derive(
    uniffi::Record, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum AuthState {
    SignedOut,
    SignedIn { user: UserProfile },
}

/// Denormalized display attributes of a chat participant.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub user_id: String,
    pub name: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatSummary {
    pub chat_id: String,
    pub peer: Option<ParticipantInfo>,
    pub last_message: String,
    pub last_message_at: i64,
    pub unread_count: u32,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PagerPhase {
    Loading,
    Live,
    LoadingOlder,
}

/// Set after older messages were prepended. The UI keeps `message_id` at the
/// same screen position; `seq` changes on every prepend so repeated anchors to
/// the same message are still observable.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ScrollAnchor {
    pub message_id: String,
    pub seq: u64,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ChatViewState {
    pub chat_id: String,
    pub peer: Option<ParticipantInfo>,
    pub phase: PagerPhase,
    pub messages: Vec<ChatMessage>,
    pub can_load_older: bool,
    pub load_error: Option<String>,
    pub scroll_anchor: Option<ScrollAnchor>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_username: Option<String>,
    pub sender_avatar_url: Option<String>,
    pub content: String,
    /// Milliseconds since the Unix epoch; a local estimate while pending.
    pub created_at: i64,
    pub read: bool,
    pub is_mine: bool,
    pub status: MessageStatus,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum MessageStatus {
    Pending,
    Confirmed,
    Failed { reason: String },
}

impl MessageStatus {
    /// Confirmation is final: a late pending echo never downgrades it.
    pub fn merge(&self, incoming: &MessageStatus) -> MessageStatus {
        match (self, incoming) {
            (MessageStatus::Confirmed, MessageStatus::Pending) => MessageStatus::Confirmed,
            _ => incoming.clone(),
        }
    }
}

/// Session-wide badges and indicators shared by every screen.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct NotificationState {
    pub unread_messages_total: u32,
    pub friend_requests_count: u32,
    pub is_sending: bool,
}

impl NotificationState {
    pub fn empty() -> Self {
        Self {
            unread_messages_total: 0,
            friend_requests_count: 0,
            is_sending: false,
        }
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssistantRole {
    User,
    Assistant,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct AssistantTurn {
    pub id: String,
    pub role: AssistantRole,
    pub text: String,
    pub rich: bool,
    pub created_at: i64,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct AssistantState {
    pub available: bool,
    pub loading: bool,
    pub turns: Vec<AssistantTurn>,
}

impl AssistantState {
    pub fn empty() -> Self {
        Self {
            available: false,
            loading: false,
            turns: vec![],
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
