pub(crate) mod assistant;
pub(crate) mod config;
mod directory;
mod notifications;
mod pager;
mod schema;
mod send;
mod session;
mod unread;

use std::sync::{Arc, RwLock};

use flume::Sender;
use hearth_store_traits::{
    DocumentStore, ListenTarget, Listener, ListenerRegistration, QuerySnapshot, StoreError,
};

use crate::actions::AppAction;
use crate::state::{AppState, BusyState, Screen, UserProfile};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use assistant::AssistantBackend;
use directory::Directory;
use notifications::NotificationCenter;
use pager::Pager;

pub(crate) use config::{default_app_config_json, load_app_config};

/// A live listener owned by the actor. Dropping it detaches the listener, so
/// replacing or clearing the field that holds it is the unsubscribe.
struct Subscription {
    token: u64,
    _registration: ListenerRegistration,
}

struct Session {
    user: UserProfile,
    token: u64,
    chats_sub: Option<Subscription>,
    friend_requests_sub: Option<Subscription>,
    directory: Directory,
    notifications: NotificationCenter,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    store: Arc<dyn DocumentStore>,
    assistant: Option<Arc<dyn AssistantBackend>>,

    session: Option<Session>,
    pager: Option<Pager>,

    // Monotonic source for subscription, pager and request tokens.
    next_token: u64,
    assistant_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        store: Arc<dyn DocumentStore>,
        assistant: Option<Arc<dyn AssistantBackend>>,
    ) -> anyhow::Result<Self> {
        let config = config::load_app_config(&data_dir);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("hearth-core-io")
            .enable_time()
            .enable_io()
            .build()?;

        let assistant = assistant.or_else(|| {
            config
                .assistant_url()
                .and_then(|url| match assistant::HttpAssistant::new(url) {
                    Ok(backend) => Some(Arc::new(backend) as Arc<dyn AssistantBackend>),
                    Err(e) => {
                        tracing::warn!(%url, %e, "assistant backend unavailable");
                        None
                    }
                })
        });

        let mut state = AppState::empty();
        state.assistant.available = assistant.is_some();

        tracing::info!(
            data_dir = %data_dir,
            backend = ?store.backend(),
            page_size = config.page_size(),
            assistant = assistant.is_some(),
            "app core ready"
        );

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            store,
            assistant,
            session: None,
            pager: None,
            next_token: 0,
            assistant_token: 0,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        Ok(this)
    }

    fn next_token(&mut self) -> u64 {
        self.next_token = self.next_token.wrapping_add(1);
        self.next_token
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep toast in state until the UI explicitly clears it. This makes the UX
        // robust to rev-gap resyncs (state() snapshot still contains the toast).
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    fn session_token(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.token)
    }

    fn my_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.user.user_id.clone())
    }

    /// Top of the navigation stack, or the default screen when the stack is empty.
    fn top_screen(&self) -> &Screen {
        self.state
            .router
            .screen_stack
            .last()
            .unwrap_or(&self.state.router.default_screen)
    }

    fn push_screen(&mut self, screen: Screen) {
        self.state.router.screen_stack.push(screen);
    }

    fn open_chat_screen(&mut self, chat_id: &str) {
        let screen = Screen::Chat {
            chat_id: chat_id.to_string(),
        };
        if self.state.router.screen_stack.last() != Some(&screen) {
            self.push_screen(screen);
        }
    }

    /// The top `Chat` screen decides which conversation the pager shows.
    fn sync_current_chat_to_router(&mut self) {
        match self.top_screen().clone() {
            Screen::Chat { chat_id } => {
                let needs_open = self
                    .pager
                    .as_ref()
                    .map(|p| p.chat_id != chat_id)
                    .unwrap_or(true);
                if needs_open {
                    self.open_pager(&chat_id);
                }
            }
            _ => self.close_pager(),
        }
    }

    /// Attach a live listener whose items are forwarded to the actor as internal
    /// events tagged with `token`.
    fn subscribe(
        &self,
        target: ListenTarget,
        token: u64,
        to_event: impl Fn(u64, Result<QuerySnapshot, StoreError>) -> InternalEvent
            + Send
            + 'static,
    ) -> Subscription {
        let collection = target.collection().to_string();
        let Listener {
            snapshots,
            registration,
        } = self.store.listen(target);
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            while let Ok(item) = snapshots.recv_async().await {
                let failed = item.is_err();
                let event = to_event(token, item);
                if tx.send(CoreMsg::Internal(Box::new(event))).is_err() || failed {
                    break;
                }
            }
            tracing::debug!(%collection, token, "listener stream ended");
        });
        Subscription {
            token,
            _registration: registration,
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ChatsSnapshot { token, result } => {
                self.handle_chats_snapshot(token, result);
            }
            InternalEvent::FriendRequestsSnapshot { token, result } => {
                self.handle_friend_requests_snapshot(token, result);
            }
            InternalEvent::MessagesSnapshot { token, result } => {
                self.handle_messages_snapshot(token, result);
            }
            InternalEvent::OlderMessagesLoaded {
                token,
                requested,
                result,
            } => {
                self.handle_older_messages(token, requested, result);
            }
            InternalEvent::MessageWriteFinished {
                session,
                chat_id,
                message_id,
                result,
            } => {
                self.handle_message_write_finished(session, &chat_id, &message_id, result);
            }
            InternalEvent::UnreadCleared { chat_id, result } => match result {
                Ok(cleared) => tracing::debug!(%chat_id, cleared, "unread reconciled"),
                // Self-healing: the next open or read pass retries.
                Err(e) => tracing::warn!(%chat_id, %e, "unread reconciliation failed"),
            },
            InternalEvent::ReadMarked {
                chat_id,
                marked,
                failed,
            } => self.handle_read_marked(&chat_id, marked, failed),
            InternalEvent::ChatStarted { session, result } => {
                self.handle_chat_started(session, result);
            }
            InternalEvent::AssistantReplied { token, result } => {
                self.handle_assistant_reply(token, result);
            }
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Session
            AppAction::SignIn { user } => {
                if let Err(e) = self.start_session(user) {
                    tracing::error!(%e, "sign in failed");
                    self.toast(format!("Sign in failed: {e}"));
                }
            }
            AppAction::SignOut => {
                self.stop_session();
            }

            // Navigation
            AppAction::PushScreen { screen } => {
                if !self.is_signed_in() && screen != Screen::SignIn {
                    self.toast("Please sign in first");
                    return;
                }
                self.push_screen(screen);
                self.sync_current_chat_to_router();
                self.emit_state();
            }
            AppAction::UpdateScreenStack { stack } => {
                self.state.router.screen_stack = stack;
                self.sync_current_chat_to_router();
                self.emit_state();
            }

            // Chat
            AppAction::StartChat { peer } => {
                self.start_chat(peer);
            }
            AppAction::OpenChat { chat_id } => {
                if !self.is_signed_in() {
                    self.toast("Please sign in first");
                    return;
                }
                self.open_chat_screen(&chat_id);
                self.sync_current_chat_to_router();
                self.emit_state();
            }
            AppAction::SetChatSearch { query } => {
                if self.state.chat_search != query {
                    self.state.chat_search = query;
                    self.rebuild_chat_list();
                    self.emit_state();
                }
            }
            AppAction::SendMessage { chat_id, content } => {
                self.send_message(&chat_id, &content);
            }
            AppAction::LoadOlderMessages { chat_id } => {
                self.load_older_messages(&chat_id);
            }

            // Assistant
            AppAction::AskAssistant { prompt, rich } => {
                self.ask_assistant(&prompt, rich);
            }
            AppAction::ClearAssistant => {
                self.clear_assistant();
            }

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }
}
