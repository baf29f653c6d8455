use crate::state::{Screen, UserProfile};

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    SignIn {
        user: UserProfile,
    },
    SignOut,

    // Navigation
    PushScreen {
        screen: Screen,
    },
    UpdateScreenStack {
        stack: Vec<Screen>,
    },

    // Chat
    StartChat {
        peer: UserProfile,
    },
    OpenChat {
        chat_id: String,
    },
    SetChatSearch {
        query: String,
    },
    SendMessage {
        chat_id: String,
        content: String,
    },
    LoadOlderMessages {
        chat_id: String,
    },

    // Assistant
    AskAssistant {
        prompt: String,
        rich: bool,
    },
    ClearAssistant,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message text or prompts).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::SignIn { .. } => "SignIn",
            AppAction::SignOut => "SignOut",

            // Navigation
            AppAction::PushScreen { .. } => "PushScreen",
            AppAction::UpdateScreenStack { .. } => "UpdateScreenStack",

            // Chat
            AppAction::StartChat { .. } => "StartChat",
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::SetChatSearch { .. } => "SetChatSearch",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",

            // Assistant
            AppAction::AskAssistant { .. } => "AskAssistant",
            AppAction::ClearAssistant => "ClearAssistant",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
