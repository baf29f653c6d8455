use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hearth_core::{
    AppAction, AppReconciler, AppState, AppUpdate, AssistantBackend, AssistantRole, AuthState,
    ChatMessage, FfiApp, MessageStatus, PagerPhase, Screen, UserProfile,
};
use hearth_memory_store::{MemoryStore, MemoryStoreConfig, Operation};
use hearth_store_traits::{DocRef, Fields, StoreError};
use serde_json::json;
use tempfile::tempdir;

const TIMEOUT: Duration = Duration::from_secs(5);

fn write_config(data_dir: &str, extra: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("hearth_config.json");
    let mut v = json!({
        "messages_per_page": 10,
        "log_filter": "hearth_core=debug",
    });
    if let (Some(base), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Replies with the prompt; "blank" gets an empty reply and "fail" an error.
struct EchoAssistant;

#[async_trait]
impl AssistantBackend for EchoAssistant {
    async fn generate(&self, prompt: &str, rich: bool) -> anyhow::Result<String> {
        match prompt {
            "blank" => Ok(String::new()),
            "fail" => Err(anyhow::anyhow!("model offline")),
            _ => Ok(format!("echo({rich}): {prompt}")),
        }
    }
}

fn profile(id: &str, name: &str) -> UserProfile {
    UserProfile {
        user_id: id.into(),
        username: id.into(),
        display_name: name.into(),
        photo_url: None,
    }
}

fn alice() -> UserProfile {
    profile("alice", "Alice")
}

fn bob() -> UserProfile {
    profile("bob", "Bob Builder")
}

fn seed_chat(store: &MemoryStore, chat_id: &str, peer: &UserProfile, unread_alice: i64) {
    store
        .seed(
            &DocRef::new("chats", chat_id),
            json!({
                "participants": ["alice", peer.user_id],
                "participantDetails": {
                    "alice": {"username": "alice", "displayName": "Alice"},
                    (peer.user_id.as_str()): {
                        "username": peer.username,
                        "displayName": peer.display_name,
                    },
                },
                "lastMessage": "",
                "lastMessageTime": 1,
                "unreadCounts": {"alice": unread_alice, (peer.user_id.as_str()): 0},
            }),
        )
        .unwrap();
}

fn seed_message(store: &MemoryStore, chat_id: &str, id: &str, from: &str, at: i64, read: bool) {
    store
        .seed(
            &DocRef::new(format!("chats/{chat_id}/messages"), id),
            json!({
                "chatId": chat_id,
                "senderId": from,
                "senderDisplayName": from,
                "content": format!("message {id}"),
                "createdAt": at,
                "read": read,
                "status": "sent",
            }),
        )
        .unwrap();
}

fn new_app(
    store: &MemoryStore,
    data_dir: &str,
    assistant: Option<Arc<dyn AssistantBackend>>,
) -> Arc<FfiApp> {
    FfiApp::with_backends(data_dir.to_string(), Arc::new(store.clone()), assistant)
}

fn signed_in(store: &MemoryStore, data_dir: &str, user: UserProfile) -> Arc<FfiApp> {
    write_config(data_dir, json!({}));
    let app = new_app(store, data_dir, None);
    app.dispatch(AppAction::SignIn { user });
    wait_until("signed in with chats loaded", TIMEOUT, || {
        let s = app.state();
        matches!(s.auth, AuthState::SignedIn { .. }) && !s.busy.loading_chats
    });
    app
}

fn open_chat(app: &FfiApp, chat_id: &str) {
    app.dispatch(AppAction::OpenChat {
        chat_id: chat_id.into(),
    });
    wait_until("chat live", TIMEOUT, || {
        app.state()
            .current_chat
            .map(|c| c.chat_id == chat_id && c.phase == PagerPhase::Live)
            .unwrap_or(false)
    });
}

fn messages(s: &AppState) -> Vec<ChatMessage> {
    s.current_chat
        .as_ref()
        .map(|c| c.messages.clone())
        .unwrap_or_default()
}

fn with_content<'a>(s: &'a [ChatMessage], content: &str) -> Vec<&'a ChatMessage> {
    s.iter().filter(|m| m.content == content).collect()
}

#[test]
fn sent_message_goes_pending_then_confirmed_and_counts_for_peer() {
    let store = MemoryStore::with_config(
        MemoryStoreConfig::default()
            .with_write_latency(Duration::from_millis(300))
            .with_latency_compensation(true),
    );
    seed_chat(&store, "c1", &bob(), 0);

    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let a = signed_in(&store, dir_a.path().to_str().unwrap(), alice());
    let b = signed_in(&store, dir_b.path().to_str().unwrap(), bob());
    let (reconciler, updates) = TestReconciler::new();
    a.listen_for_updates(Box::new(reconciler));

    open_chat(&a, "c1");
    a.dispatch(AppAction::SendMessage {
        chat_id: "c1".into(),
        content: "  hello  ".into(),
    });

    wait_until("message confirmed", TIMEOUT, || {
        let s = a.state();
        let msgs = messages(&s);
        let hello = with_content(&msgs, "hello");
        hello.len() == 1 && hello[0].status == MessageStatus::Confirmed
    });

    // Every published state showed the message at most once, pending first.
    let updates = updates.lock().unwrap().clone();
    let mut saw_pending = false;
    for AppUpdate::FullState(s) in &updates {
        let msgs = messages(s);
        let hello = with_content(&msgs, "hello");
        assert!(hello.len() <= 1, "duplicate optimistic message");
        if let Some(m) = hello.first() {
            assert!(m.is_mine);
            if m.status == MessageStatus::Pending {
                saw_pending = true;
            }
        }
    }
    assert!(saw_pending, "message was never shown as pending");

    wait_until("send flag cleared", TIMEOUT, || {
        !a.state().notifications.is_sending
    });

    wait_until("peer sees unread", TIMEOUT, || {
        b.state()
            .chat_list
            .first()
            .map(|c| c.unread_count == 1 && c.last_message == "hello")
            .unwrap_or(false)
    });
    assert_eq!(b.state().notifications.unread_messages_total, 1);
    assert_eq!(a.state().chat_list[0].unread_count, 0);
}

#[test]
fn older_pages_prepend_until_history_is_exhausted() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    for i in 1..=25 {
        seed_message(&store, "c1", &format!("m{i:02}"), "bob", i * 1_000, true);
    }

    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    open_chat(&a, "c1");
    wait_until("newest page", TIMEOUT, || messages(&a.state()).len() == 10);
    let s = a.state();
    let chat = s.current_chat.as_ref().unwrap();
    assert_eq!(chat.messages[0].id, "m16");
    assert_eq!(chat.messages[9].id, "m25");
    // A full first page says nothing about what is left.
    assert!(chat.can_load_older);
    assert!(chat.scroll_anchor.is_none());

    a.dispatch(AppAction::LoadOlderMessages {
        chat_id: "c1".into(),
    });
    wait_until("second page", TIMEOUT, || {
        let s = a.state();
        messages(&s).len() == 20 && s.current_chat.unwrap().phase == PagerPhase::Live
    });
    let chat = a.state().current_chat.unwrap();
    assert!(chat.can_load_older);
    assert_eq!(chat.scroll_anchor.as_ref().unwrap().message_id, "m16");

    a.dispatch(AppAction::LoadOlderMessages {
        chat_id: "c1".into(),
    });
    wait_until("short last page", TIMEOUT, || {
        let s = a.state();
        messages(&s).len() == 25 && s.current_chat.unwrap().phase == PagerPhase::Live
    });
    let chat = a.state().current_chat.unwrap();
    assert!(!chat.can_load_older);
    assert_eq!(chat.scroll_anchor.as_ref().unwrap().message_id, "m06");
    let ids: Vec<String> = chat.messages.iter().map(|m| m.id.clone()).collect();
    let expected: Vec<String> = (1..=25).map(|i| format!("m{i:02}")).collect();
    assert_eq!(ids, expected);

    // Nothing left to fetch: further requests are ignored.
    a.dispatch(AppAction::LoadOlderMessages {
        chat_id: "c1".into(),
    });
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(messages(&a.state()).len(), 25);
}

#[test]
fn failed_send_is_rolled_back_but_preview_stays() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    open_chat(&a, "c1");

    store.fail_next(Operation::Set, StoreError::Unavailable("offline".into()));
    a.dispatch(AppAction::SendMessage {
        chat_id: "c1".into(),
        content: "lost".into(),
    });

    wait_until("failure toast", TIMEOUT, || {
        a.state()
            .toast
            .map(|t| t.starts_with("Failed to send message"))
            .unwrap_or(false)
    });
    let s = a.state();
    assert!(with_content(&messages(&s), "lost").is_empty());
    assert!(!s.notifications.is_sending);
    assert_eq!(store.count("chats/c1/messages"), 0);

    // The preview and the peer's counter were written independently.
    let chat = store.peek(&DocRef::new("chats", "c1")).unwrap();
    assert_eq!(chat["lastMessage"], json!("lost"));
    assert_eq!(chat["unreadCounts"]["bob"], json!(1));

    a.dispatch(AppAction::ClearToast);
    wait_until("toast cleared", TIMEOUT, || a.state().toast.is_none());
}

#[test]
fn rapid_sends_converge_without_duplicates() {
    let store = MemoryStore::with_config(
        MemoryStoreConfig::default()
            .with_write_latency(Duration::from_millis(50))
            .with_latency_compensation(true),
    );
    seed_chat(&store, "c1", &bob(), 0);
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    open_chat(&a, "c1");

    for text in ["one", "two", "three"] {
        a.dispatch(AppAction::SendMessage {
            chat_id: "c1".into(),
            content: text.into(),
        });
    }
    // Whitespace-only input is not sent.
    a.dispatch(AppAction::SendMessage {
        chat_id: "c1".into(),
        content: "   ".into(),
    });

    wait_until("all confirmed", TIMEOUT, || {
        let msgs = messages(&a.state());
        msgs.len() == 3 && msgs.iter().all(|m| m.status == MessageStatus::Confirmed)
    });
    let msgs = messages(&a.state());
    // Concurrent writes may commit in any order; the window follows commit time.
    let mut contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
    assert!(msgs.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    contents.sort_unstable();
    assert_eq!(contents, vec!["one", "three", "two"]);
    assert_eq!(store.count("chats/c1/messages"), 3);
    let chat = store.peek(&DocRef::new("chats", "c1")).unwrap();
    assert_eq!(chat["unreadCounts"]["bob"], json!(3));
}

#[test]
fn opening_a_chat_clears_unread_and_marks_messages_read() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 2);
    seed_message(&store, "c1", "m1", "bob", 1_000, false);
    seed_message(&store, "c1", "m2", "bob", 2_000, false);

    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    assert_eq!(a.state().chat_list[0].unread_count, 2);
    assert_eq!(a.state().notifications.unread_messages_total, 2);

    open_chat(&a, "c1");
    wait_until("counter cleared in store", TIMEOUT, || {
        store.peek(&DocRef::new("chats", "c1")).unwrap()["unreadCounts"]["alice"] == json!(0)
    });
    wait_until("messages flagged read", TIMEOUT, || {
        ["m1", "m2"].iter().all(|id| {
            store.peek(&DocRef::new("chats/c1/messages", *id)).unwrap()["read"] == json!(true)
        })
    });
    wait_until("list shows zero", TIMEOUT, || {
        let s = a.state();
        s.chat_list[0].unread_count == 0 && s.notifications.unread_messages_total == 0
    });
}

#[test]
fn switching_chats_detaches_previous_listener() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    seed_chat(&store, "c2", &profile("carol", "Carol"), 0);

    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    // Chats and friend requests.
    wait_until("session listeners", TIMEOUT, || store.listener_count() == 2);

    open_chat(&a, "c1");
    wait_until("first pager attached", TIMEOUT, || store.listener_count() == 3);

    open_chat(&a, "c2");
    wait_until("still one pager", TIMEOUT, || store.listener_count() == 3);
    assert_eq!(a.state().current_chat.unwrap().chat_id, "c2");

    a.dispatch(AppAction::UpdateScreenStack { stack: vec![] });
    wait_until("pager detached", TIMEOUT, || store.listener_count() == 2);
    assert!(a.state().current_chat.is_none());

    a.dispatch(AppAction::SignOut);
    wait_until("all detached", TIMEOUT, || store.listener_count() == 0);
    let s = a.state();
    assert!(matches!(s.auth, AuthState::SignedOut));
    assert!(s.chat_list.is_empty());
    assert_eq!(s.router.default_screen, Screen::SignIn);
}

#[test]
fn start_chat_reuses_or_creates_conversation() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());

    a.dispatch(AppAction::StartChat { peer: bob() });
    wait_until("existing chat opened", TIMEOUT, || {
        a.state().router.screen_stack.last()
            == Some(&Screen::Chat {
                chat_id: "c1".into(),
            })
    });
    assert_eq!(store.count("chats"), 1);

    a.dispatch(AppAction::StartChat {
        peer: profile("dave", "Dave"),
    });
    wait_until("new chat created", TIMEOUT, || store.count("chats") == 2);
    wait_until("new chat opened", TIMEOUT, || {
        let s = a.state();
        !s.busy.creating_chat
            && matches!(s.router.screen_stack.last(), Some(Screen::Chat { chat_id }) if chat_id != "c1")
    });
    wait_until("directory includes new chat", TIMEOUT, || {
        a.state().chat_list.len() == 2
    });

    a.dispatch(AppAction::StartChat { peer: alice() });
    wait_until("self chat rejected", TIMEOUT, || {
        a.state().toast.as_deref() == Some("You can't start a chat with yourself")
    });
    assert_eq!(store.count("chats"), 2);
}

#[test]
fn search_narrows_chat_list_by_peer_name() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 1);
    seed_chat(&store, "c2", &profile("carol", "Carol"), 0);
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    assert_eq!(a.state().chat_list.len(), 2);

    a.dispatch(AppAction::SetChatSearch {
        query: "BUILD".into(),
    });
    wait_until("filtered", TIMEOUT, || a.state().chat_list.len() == 1);
    let s = a.state();
    assert_eq!(s.chat_list[0].chat_id, "c1");
    assert_eq!(s.notifications.unread_messages_total, 1);

    a.dispatch(AppAction::SetChatSearch {
        query: String::new(),
    });
    wait_until("unfiltered", TIMEOUT, || a.state().chat_list.len() == 2);
}

#[test]
fn new_message_notice_only_when_reading_elsewhere() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    assert!(a.state().toast.is_none());

    let chat = DocRef::new("chats", "c1");
    store
        .apply_remote_update(
            &chat,
            Fields::new()
                .set("lastMessage", "yo")
                .increment("unreadCounts.alice", 1),
        )
        .unwrap();
    wait_until("notice raised", TIMEOUT, || {
        let s = a.state();
        s.notifications.unread_messages_total == 1
            && s.toast.as_deref() == Some("New message received!")
    });

    a.dispatch(AppAction::ClearToast);
    a.dispatch(AppAction::PushScreen {
        screen: Screen::Messages,
    });
    wait_until("on messages", TIMEOUT, || {
        a.state().router.screen_stack.last() == Some(&Screen::Messages)
    });
    store
        .apply_remote_update(&chat, Fields::new().increment("unreadCounts.alice", 1))
        .unwrap();
    wait_until("total rose", TIMEOUT, || {
        a.state().notifications.unread_messages_total == 2
    });
    assert!(a.state().toast.is_none());

    store
        .seed(
            &DocRef::new("users/alice/friendRequests", "r1"),
            json!({"from": "erin"}),
        )
        .unwrap();
    wait_until("friend request badge", TIMEOUT, || {
        a.state().notifications.friend_requests_count == 1
    });
}

#[test]
fn assistant_turns_follow_replies() {
    let store = MemoryStore::default();
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir, json!({}));
    let a = new_app(&store, data_dir, Some(Arc::new(EchoAssistant)));
    a.dispatch(AppAction::SignIn { user: alice() });
    wait_until("assistant available", TIMEOUT, || {
        let s = a.state();
        s.assistant.available && matches!(s.auth, AuthState::SignedIn { .. })
    });

    a.dispatch(AppAction::AskAssistant {
        prompt: "hi there".into(),
        rich: true,
    });
    wait_until("reply", TIMEOUT, || a.state().assistant.turns.len() == 2);
    let s = a.state();
    assert!(!s.assistant.loading);
    assert_eq!(s.assistant.turns[0].role, AssistantRole::User);
    assert_eq!(s.assistant.turns[1].role, AssistantRole::Assistant);
    assert_eq!(s.assistant.turns[1].text, "echo(true): hi there");

    a.dispatch(AppAction::AskAssistant {
        prompt: "blank".into(),
        rich: false,
    });
    wait_until("fallback reply", TIMEOUT, || a.state().assistant.turns.len() == 4);
    assert_eq!(
        a.state().assistant.turns[3].text,
        "I'm sorry, I couldn't process that."
    );

    a.dispatch(AppAction::AskAssistant {
        prompt: "fail".into(),
        rich: false,
    });
    wait_until("failure toast", TIMEOUT, || {
        a.state().toast.as_deref() == Some("Failed to get AI response")
    });
    let s = a.state();
    assert_eq!(s.assistant.turns.len(), 5);
    assert!(!s.assistant.loading);

    a.dispatch(AppAction::ClearAssistant);
    wait_until("history cleared", TIMEOUT, || a.state().assistant.turns.is_empty());
}

#[test]
fn assistant_unavailable_without_backend() {
    let store = MemoryStore::default();
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    assert!(!a.state().assistant.available);
    a.dispatch(AppAction::AskAssistant {
        prompt: "anyone?".into(),
        rich: false,
    });
    wait_until("unavailable toast", TIMEOUT, || {
        a.state().toast.as_deref() == Some("Assistant is not configured")
    });
    assert!(a.state().assistant.turns.is_empty());
}

#[test]
fn rev_is_strictly_increasing() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir, json!({"near_bottom_threshold_px": 80.0}));
    let a = new_app(&store, data_dir, None);
    assert_eq!(a.near_bottom_threshold_px(), 80.0);
    let (reconciler, updates) = TestReconciler::new();
    a.listen_for_updates(Box::new(reconciler));

    a.dispatch(AppAction::SignIn { user: alice() });
    a.dispatch(AppAction::OpenChat {
        chat_id: "c1".into(),
    });
    a.dispatch(AppAction::SendMessage {
        chat_id: "c1".into(),
        content: "ping".into(),
    });
    wait_until("message confirmed", TIMEOUT, || {
        messages(&a.state())
            .iter()
            .any(|m| m.content == "ping" && m.status == MessageStatus::Confirmed)
    });

    let revs: Vec<u64> = updates.lock().unwrap().iter().map(|u| u.rev()).collect();
    assert!(!revs.is_empty());
    assert!(revs.windows(2).all(|w| w[0] < w[1]), "revs not monotonic: {revs:?}");
    // The snapshot is committed before the update is published.
    assert!(a.state().rev >= *revs.last().unwrap());
}

#[test]
fn signed_out_actions_are_rejected() {
    let store = MemoryStore::default();
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir, json!({}));
    let a = new_app(&store, data_dir, None);
    a.dispatch(AppAction::SendMessage {
        chat_id: "c1".into(),
        content: "hello".into(),
    });
    wait_until("sign-in toast", TIMEOUT, || {
        a.state().toast.as_deref() == Some("Please sign in first")
    });
    assert_eq!(store.count("chats/c1/messages"), 0);
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn send_right_after_open_reaches_store_and_peer() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir, json!({}));
    let a = new_app(&store, data_dir, None);

    // No waiting: the chats snapshot has not arrived when the send runs.
    a.dispatch(AppAction::SignIn { user: alice() });
    a.dispatch(AppAction::OpenChat {
        chat_id: "c1".into(),
    });
    a.dispatch(AppAction::SendMessage {
        chat_id: "c1".into(),
        content: "early".into(),
    });

    wait_until("early message confirmed", TIMEOUT, || {
        let msgs = messages(&a.state());
        let early = with_content(&msgs, "early");
        early.len() == 1 && early[0].status == MessageStatus::Confirmed
    });
    assert!(a.state().toast.is_none());
    assert_eq!(store.count("chats/c1/messages"), 1);
    let chat = store.peek(&DocRef::new("chats", "c1")).unwrap();
    assert_eq!(chat["lastMessage"], json!("early"));
    assert_eq!(chat["unreadCounts"]["bob"], json!(1));
}

#[test]
fn send_to_unknown_chat_fails_with_toast() {
    let store = MemoryStore::default();
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());

    a.dispatch(AppAction::SendMessage {
        chat_id: "ghost".into(),
        content: "anyone?".into(),
    });
    wait_until("not found toast", TIMEOUT, || {
        a.state().toast.as_deref() == Some("Failed to send message: Chat not found")
    });
    assert!(!a.state().notifications.is_sending);
    assert_eq!(store.count("chats/ghost/messages"), 0);
    assert!(store.peek(&DocRef::new("chats", "ghost")).is_none());
}

#[test]
fn older_page_keeps_messages_sharing_the_boundary_timestamp() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    seed_message(&store, "c1", "a", "bob", 1_000, true);
    seed_message(&store, "c1", "b", "bob", 1_000, true);
    for i in 1..=9 {
        seed_message(&store, "c1", &format!("m{i:02}"), "bob", 1_000 + i * 1_000, true);
    }

    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    open_chat(&a, "c1");
    wait_until("newest page", TIMEOUT, || messages(&a.state()).len() == 10);
    // The first page ends inside the tie group.
    assert_eq!(messages(&a.state())[0].id, "b");

    a.dispatch(AppAction::LoadOlderMessages {
        chat_id: "c1".into(),
    });
    wait_until("tie partner loaded", TIMEOUT, || {
        let s = a.state();
        messages(&s).len() == 11 && s.current_chat.unwrap().phase == PagerPhase::Live
    });
    let chat = a.state().current_chat.unwrap();
    let ids: Vec<&str> = chat.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(&ids[..3], &["a", "b", "m01"]);
    assert!(!chat.can_load_older);
    assert_eq!(chat.scroll_anchor.as_ref().unwrap().message_id, "b");
}

#[test]
fn failed_older_page_keeps_window_and_allows_retry() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    for i in 1..=25 {
        seed_message(&store, "c1", &format!("m{i:02}"), "bob", i * 1_000, true);
    }
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    open_chat(&a, "c1");
    wait_until("newest page", TIMEOUT, || messages(&a.state()).len() == 10);

    store.fail_next(Operation::Query, StoreError::Unavailable("offline".into()));
    a.dispatch(AppAction::LoadOlderMessages {
        chat_id: "c1".into(),
    });
    wait_until("older page toast", TIMEOUT, || {
        a.state()
            .toast
            .map(|t| t.starts_with("Could not load older messages"))
            .unwrap_or(false)
    });
    let chat = a.state().current_chat.unwrap();
    assert_eq!(chat.phase, PagerPhase::Live);
    assert!(chat.can_load_older);
    assert!(chat.scroll_anchor.is_none());
    let ids: Vec<String> = chat.messages.iter().map(|m| m.id.clone()).collect();
    let expected: Vec<String> = (16..=25).map(|i| format!("m{i:02}")).collect();
    assert_eq!(ids, expected);

    a.dispatch(AppAction::ClearToast);
    a.dispatch(AppAction::LoadOlderMessages {
        chat_id: "c1".into(),
    });
    wait_until("retry succeeds", TIMEOUT, || messages(&a.state()).len() == 20);
}

#[test]
fn failed_message_listener_reports_once_and_stays_loading() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 0);
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    wait_until("session listeners", TIMEOUT, || store.listener_count() == 2);
    let (reconciler, updates) = TestReconciler::new();
    a.listen_for_updates(Box::new(reconciler));

    store.fail_next(Operation::Listen, StoreError::Unavailable("offline".into()));
    a.dispatch(AppAction::OpenChat {
        chat_id: "c1".into(),
    });
    wait_until("load error shown", TIMEOUT, || {
        a.state()
            .current_chat
            .map(|c| c.load_error.is_some())
            .unwrap_or(false)
    });
    std::thread::sleep(Duration::from_millis(100));

    let s = a.state();
    let chat = s.current_chat.as_ref().unwrap();
    assert_eq!(chat.phase, PagerPhase::Loading);
    assert!(chat.messages.is_empty());
    assert_eq!(
        s.toast.as_deref(),
        Some("Could not load messages: store unavailable: offline")
    );
    assert_eq!(store.listener_count(), 2);

    let updates = updates.lock().unwrap().clone();
    let mut raised = 0;
    let mut previous: Option<String> = None;
    for AppUpdate::FullState(s) in &updates {
        if s.toast.is_some() && s.toast != previous {
            raised += 1;
        }
        previous = s.toast.clone();
    }
    assert_eq!(raised, 1);
}

#[test]
fn failed_unread_clear_does_not_block_the_conversation() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 2);
    seed_message(&store, "c1", "m1", "bob", 1_000, false);
    seed_message(&store, "c1", "m2", "bob", 2_000, false);
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());
    let (reconciler, updates) = TestReconciler::new();
    a.listen_for_updates(Box::new(reconciler));

    store.fail_next(
        Operation::Transaction,
        StoreError::Unavailable("offline".into()),
    );
    open_chat(&a, "c1");
    wait_until("messages shown", TIMEOUT, || messages(&a.state()).len() == 2);
    // Opening zeroes the counter locally whatever the store says.
    assert_eq!(a.state().notifications.unread_messages_total, 0);

    // The read pass after the first snapshot runs the clear again.
    wait_until("counter cleared in store", TIMEOUT, || {
        store.peek(&DocRef::new("chats", "c1")).unwrap()["unreadCounts"]["alice"] == json!(0)
    });
    assert!(updates
        .lock()
        .unwrap()
        .iter()
        .all(|AppUpdate::FullState(s)| s.toast.is_none()));
}

#[test]
fn failed_read_flag_is_written_on_retry() {
    let store = MemoryStore::default();
    seed_chat(&store, "c1", &bob(), 2);
    seed_message(&store, "c1", "m1", "bob", 1_000, false);
    seed_message(&store, "c1", "m2", "bob", 2_000, false);
    let dir = tempdir().unwrap();
    let a = signed_in(&store, dir.path().to_str().unwrap(), alice());

    store.fail_next(Operation::Update, StoreError::Unavailable("offline".into()));
    open_chat(&a, "c1");
    wait_until("both flagged read", TIMEOUT, || {
        ["m1", "m2"].iter().all(|id| {
            store.peek(&DocRef::new("chats/c1/messages", *id)).unwrap()["read"] == json!(true)
        })
    });
    assert!(a.state().toast.is_none());
}
