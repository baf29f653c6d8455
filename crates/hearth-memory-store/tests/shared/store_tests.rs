//! Behavior every `DocumentStore` must exhibit

use std::sync::Arc;
use std::time::Duration;

use hearth_store_traits::{
    DocRef, Direction, Document, DocumentStore, Fields, ListenTarget, Query, SetOptions, StoreError,
    Write,
};
use serde_json::json;

async fn seed_chat<S: DocumentStore>(store: &S, id: &str, unread_bob: i64) -> DocRef {
    let chat = DocRef::new("chats", id);
    store
        .set(
            &chat,
            Fields::new()
                .set("participants", json!(["alice", "bob"]))
                .set("lastMessage", "")
                .set("lastMessageTime", 0)
                .set("unreadCounts", json!({"alice": 0, "bob": unread_bob})),
            SetOptions::Overwrite,
        )
        .await
        .unwrap();
    chat
}

pub async fn test_update_missing_document<S: DocumentStore>(store: Arc<S>) {
    let err = store
        .update(&DocRef::new("chats", "nope"), Fields::new().set("x", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

pub async fn test_concurrent_increments<S: DocumentStore>(store: Arc<S>) {
    let chat = seed_chat(store.as_ref(), "c1", 0).await;

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let store = store.clone();
        let chat = chat.clone();
        tasks.push(tokio::spawn(async move {
            store
                .update(&chat, Fields::new().increment("unreadCounts.bob", 1))
                .await
                .unwrap();
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    let doc = store.get(&chat).await.unwrap().unwrap();
    assert_eq!(doc.get("unreadCounts.bob"), Some(&json!(50)));
    assert_eq!(doc.get("unreadCounts.alice"), Some(&json!(0)));
}

pub async fn test_server_timestamps_monotonic<S: DocumentStore>(store: Arc<S>) {
    let mut last = i64::MIN;
    for i in 0..20 {
        let doc = DocRef::new("chats/c1/messages", format!("m{i}"));
        store
            .set(
                &doc,
                Fields::new().set("content", "x").server_timestamp("createdAt"),
                SetOptions::Overwrite,
            )
            .await
            .unwrap();
        let ts = store
            .get(&doc)
            .await
            .unwrap()
            .and_then(|d| d.get("createdAt").and_then(|v| v.as_i64()))
            .unwrap();
        assert!(ts > last, "server timestamps must strictly increase");
        last = ts;
    }
}

pub async fn test_listener_snapshots<S: DocumentStore>(store: Arc<S>) {
    let listener = store.listen(ListenTarget::Query(
        Query::collection("chats").where_array_contains("participants", "alice"),
    ));

    let first = listener.snapshots.recv_async().await.unwrap().unwrap();
    assert!(first.is_empty(), "initial snapshot reflects an empty collection");

    seed_chat(store.as_ref(), "c1", 0).await;
    let second = tokio::time::timeout(Duration::from_secs(2), listener.snapshots.recv_async())
        .await
        .expect("snapshot after write")
        .unwrap()
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.docs[0].id(), "c1");

    // Writes outside the query's result set produce no new snapshot.
    store
        .set(
            &DocRef::new("chats", "c2"),
            Fields::new().set("participants", json!(["carol", "dave"])),
            SetOptions::Overwrite,
        )
        .await
        .unwrap();
    assert!(listener.snapshots.try_recv().is_err());
}

pub async fn test_listener_detach<S: DocumentStore>(store: Arc<S>) {
    let listener = store.listen(ListenTarget::Query(Query::collection("chats")));
    let _initial = listener.snapshots.recv_async().await.unwrap().unwrap();
    let rx = listener.snapshots.clone();
    drop(listener);

    seed_chat(store.as_ref(), "c1", 0).await;
    // Sender side is gone once detached: the channel reports disconnection.
    let next = tokio::time::timeout(Duration::from_secs(1), rx.recv_async()).await;
    assert!(matches!(next, Ok(Err(_))));
}

pub async fn test_document_listener<S: DocumentStore>(store: Arc<S>) {
    let chat = DocRef::new("chats", "c1");
    let listener = store.listen(ListenTarget::Document(chat.clone()));
    let initial = listener.snapshots.recv_async().await.unwrap().unwrap();
    assert!(initial.is_empty());

    seed_chat(store.as_ref(), "c1", 0).await;
    let created = listener.snapshots.recv_async().await.unwrap().unwrap();
    assert_eq!(created.len(), 1);

    store
        .update(&chat, Fields::new().set("lastMessage", "hi"))
        .await
        .unwrap();
    let updated = listener.snapshots.recv_async().await.unwrap().unwrap();
    assert_eq!(updated.docs[0].get("lastMessage"), Some(&json!("hi")));
}

fn clear_body(chat: DocRef, user: &'static str) -> hearth_store_traits::TransactionBody {
    Box::new(move |view| {
        let Some(doc) = view.get(&chat)? else {
            return Ok(vec![]);
        };
        let path = format!("unreadCounts.{user}");
        let current = doc.get(&path).and_then(|v| v.as_i64()).unwrap_or(0);
        if current > 0 {
            Ok(vec![Write::Update {
                doc: chat.clone(),
                fields: Fields::new().set(path, 0),
            }])
        } else {
            Ok(vec![])
        }
    })
}

pub async fn test_guarded_clear_transaction<S: DocumentStore>(store: Arc<S>) {
    let chat = seed_chat(store.as_ref(), "c1", 4).await;

    let committed = store
        .run_transaction(vec![chat.clone()], clear_body(chat.clone(), "bob"))
        .await
        .unwrap();
    assert!(committed.is_some());
    let doc = store.get(&chat).await.unwrap().unwrap();
    assert_eq!(doc.get("unreadCounts.bob"), Some(&json!(0)));

    // Already zero: nothing to write.
    let committed = store
        .run_transaction(vec![chat.clone()], clear_body(chat.clone(), "bob"))
        .await
        .unwrap();
    assert!(committed.is_none());
}

pub async fn test_transaction_without_writes<S: DocumentStore>(store: Arc<S>) {
    let missing = DocRef::new("chats", "missing");
    let out = store
        .run_transaction(vec![missing.clone()], clear_body(missing, "bob"))
        .await
        .unwrap();
    assert!(out.is_none());
}

pub async fn test_backward_pagination<S: DocumentStore>(store: Arc<S>) {
    let collection = "chats/c1/messages";
    for i in 1..=23i64 {
        store
            .set(
                &DocRef::new(collection, format!("m{i:02}")),
                Fields::new().set("createdAt", i * 10),
                SetOptions::Overwrite,
            )
            .await
            .unwrap();
    }

    let newest = store
        .query(
            &Query::collection(collection)
                .order_by("createdAt", Direction::Descending)
                .limit(10),
        )
        .await
        .unwrap();
    assert_eq!(newest.len(), 10);
    let cursor_of = |d: &Document| (d.get("createdAt").cloned().unwrap(), d.id().to_string());
    let mut oldest_seen = cursor_of(newest.docs.last().unwrap());

    let mut pages = vec![newest.len()];
    loop {
        let page = store
            .query(
                &Query::collection(collection)
                    .order_by("createdAt", Direction::Descending)
                    .start_after_doc(oldest_seen.0.clone(), oldest_seen.1.clone())
                    .limit(10),
            )
            .await
            .unwrap();
        pages.push(page.len());
        match page.docs.last() {
            Some(d) if page.len() == 10 => oldest_seen = cursor_of(d),
            _ => break,
        }
    }
    assert_eq!(pages, vec![10, 10, 3]);
}

pub async fn test_add_generates_distinct_ids<S: DocumentStore>(store: Arc<S>) {
    let a = store
        .add("chats", Fields::new().set("participants", json!(["a", "b"])))
        .await
        .unwrap();
    let b = store
        .add("chats", Fields::new().set("participants", json!(["a", "c"])))
        .await
        .unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(a.collection, "chats");
    assert!(store.get(&a).await.unwrap().is_some());
}
