//! Snapshot fan-out to live listeners

use hearth_store_traits::{ListenTarget, QuerySnapshot};

use crate::Inner;

fn snapshot_for(inner: &Inner, target: &ListenTarget) -> QuerySnapshot {
    match target {
        ListenTarget::Query(q) => QuerySnapshot {
            docs: q.evaluate(inner.visible_in(&q.collection)),
        },
        ListenTarget::Document(doc) => {
            let pending = inner.overlays.get(doc).is_some_and(|v| !v.is_empty());
            let docs = inner
                .visible_data(doc)
                .map(|data| hearth_store_traits::Document {
                    reference: doc.clone(),
                    data,
                    has_pending_writes: pending,
                })
                .into_iter()
                .collect();
            QuerySnapshot { docs }
        }
    }
}

/// Push a snapshot to every listener whose result set changed since its last
/// delivery. Listeners whose receiver is gone are detached.
pub(crate) fn notify(inner: &mut Inner) {
    let mut dead = Vec::new();
    let updates: Vec<(u64, QuerySnapshot)> = inner
        .listeners
        .iter()
        .filter_map(|(id, entry)| {
            let snap = snapshot_for(inner, &entry.target);
            if entry.last.as_ref() == Some(&snap) {
                None
            } else {
                Some((*id, snap))
            }
        })
        .collect();

    for (id, snap) in updates {
        if let Some(entry) = inner.listeners.get_mut(&id) {
            if entry.tx.send(Ok(snap.clone())).is_err() {
                dead.push(id);
                continue;
            }
            entry.last = Some(snap);
        }
    }
    for id in dead {
        inner.listeners.remove(&id);
    }
}
