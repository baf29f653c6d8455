//! Badge counters and the in-app "new message" notice.

use hearth_store_traits::{ListenTarget, Query};

use super::schema;
use super::AppCore;
use crate::state::Screen;
use crate::updates::InternalEvent;

pub(crate) const NEW_MESSAGE_TOAST: &str = "New message received!";

#[derive(Debug, Default)]
pub(crate) struct NotificationCenter {
    prev_total: u32,
    // The first directory snapshot only sets the baseline.
    seen_first: bool,
    sends_in_flight: usize,
}

impl NotificationCenter {
    /// Record a new unread total. Returns true when it rose after the baseline.
    pub(crate) fn observe(&mut self, total: u32) -> bool {
        let rose = self.seen_first && total > self.prev_total;
        self.prev_total = total;
        self.seen_first = true;
        rose
    }

    pub(crate) fn send_started(&mut self) {
        self.sends_in_flight += 1;
    }

    pub(crate) fn send_finished(&mut self) {
        self.sends_in_flight = self.sends_in_flight.saturating_sub(1);
    }

    pub(crate) fn is_sending(&self) -> bool {
        self.sends_in_flight > 0
    }
}

impl AppCore {
    /// Sync the unread badge with the directory and raise the notice when the
    /// reader is elsewhere. The caller emits.
    pub(super) fn observe_unread_total(&mut self) {
        let Some(sess) = self.session.as_mut().filter(|s| s.directory.is_loaded()) else {
            return;
        };
        let total = sess.directory.total_unread(&sess.user.user_id);
        // Local zeroing is not a "rise", but it still moves the baseline.
        let rose = sess.notifications.observe(total);
        self.state.notifications.unread_messages_total = total;

        let reading = matches!(self.top_screen(), Screen::Messages | Screen::Chat { .. });
        if rose && !reading && self.config.toast_on_new_message() {
            tracing::debug!(total, "new message notice");
            self.state.toast = Some(NEW_MESSAGE_TOAST.to_string());
        }
    }

    pub(super) fn refresh_sending_flag(&mut self) {
        self.state.notifications.is_sending = self
            .session
            .as_ref()
            .map(|s| s.notifications.is_sending())
            .unwrap_or(false);
    }

    pub(super) fn start_friend_requests_subscription(&mut self) {
        let Some(my_id) = self.my_id() else {
            return;
        };
        let token = self.next_token();
        let query = Query::collection(schema::friend_requests_collection(&my_id));
        let sub = self.subscribe(ListenTarget::Query(query), token, |token, r| {
            InternalEvent::FriendRequestsSnapshot {
                token,
                result: r.map(|s| s.len()).map_err(|e| e.to_string()),
            }
        });
        if let Some(sess) = self.session.as_mut() {
            sess.friend_requests_sub = Some(sub);
        }
    }

    pub(super) fn handle_friend_requests_snapshot(
        &mut self,
        token: u64,
        result: Result<usize, String>,
    ) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.friend_requests_sub.as_ref().map(|s| s.token) != Some(token) {
            return;
        }
        match result {
            Ok(count) => {
                let count = u32::try_from(count).unwrap_or(u32::MAX);
                if self.state.notifications.friend_requests_count != count {
                    self.state.notifications.friend_requests_count = count;
                    self.emit_state();
                }
            }
            Err(e) => {
                // The badge keeps its last value; nothing else depends on it.
                tracing::warn!(%e, "friend request listener failed");
                sess.friend_requests_sub = None;
            }
        }
    }
}
