// Session lifecycle: sign-in attaches the per-user listeners, sign-out drops them.

use super::*;

use crate::state::{AuthState, NotificationState, Router};

impl AppCore {
    pub(super) fn start_session(&mut self, user: UserProfile) -> anyhow::Result<()> {
        if user.user_id.trim().is_empty() {
            anyhow::bail!("missing user id");
        }
        // Tear down any existing session first.
        self.stop_session();

        let token = self.next_token();
        tracing::info!(user_id = %user.user_id, session = token, "start_session");

        self.session = Some(Session {
            user: user.clone(),
            token,
            chats_sub: None,
            friend_requests_sub: None,
            directory: Directory::default(),
            notifications: NotificationCenter::default(),
        });

        self.state.auth = AuthState::SignedIn { user };
        self.state.router = Router {
            default_screen: Screen::Home,
            screen_stack: vec![],
        };
        self.state.busy.loading_chats = true;

        self.start_chats_subscription();
        self.start_friend_requests_subscription();
        self.emit_state();
        Ok(())
    }

    pub(super) fn stop_session(&mut self) {
        self.close_pager();
        let Some(sess) = self.session.take() else {
            return;
        };
        tracing::info!(user_id = %sess.user.user_id, session = sess.token, "stop_session");
        // Dropping the session drops its subscriptions, which detaches them.
        drop(sess);

        // Pending assistant replies belong to the old user.
        self.assistant_token = self.assistant_token.wrapping_add(1);

        self.state.auth = AuthState::SignedOut;
        self.state.router = Router {
            default_screen: Screen::SignIn,
            screen_stack: vec![],
        };
        self.state.busy = BusyState::idle();
        self.state.chat_list.clear();
        self.state.chat_search.clear();
        self.state.current_chat = None;
        self.state.notifications = NotificationState::empty();
        self.state.assistant.turns.clear();
        self.state.assistant.loading = false;
        self.emit_state();
    }
}
