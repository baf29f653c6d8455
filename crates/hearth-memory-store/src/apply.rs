//! Applying writes to raw document data

use hearth_store_traits::document::{get_path_mut, remove_path};
use hearth_store_traits::{FieldValue, Fields, SetOptions};
use serde_json::{Map, Number, Value};

/// Resolve a single field write against the current value of that field.
fn resolve(current: Option<&Value>, write: &FieldValue, now_ms: i64) -> Option<Value> {
    match write {
        FieldValue::Value(v) => Some(v.clone()),
        FieldValue::ServerTimestamp => Some(Value::Number(now_ms.into())),
        FieldValue::Increment(by) => {
            let base = current.and_then(Value::as_i64).unwrap_or(0);
            Some(Value::Number(Number::from(base.saturating_add(*by))))
        }
        FieldValue::Delete => None,
    }
}

/// Deep-merge `patch` into `target`: nested objects merge, everything else replaces.
fn merge_into(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (k, v) in patch {
        match (target.get_mut(&k), v) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming)
            }
            (_, v) => {
                target.insert(k, v);
            }
        }
    }
}

/// Result of `set`: the full new document data.
pub(crate) fn apply_set(
    existing: Option<&Map<String, Value>>,
    fields: &Fields,
    options: SetOptions,
    now_ms: i64,
) -> Map<String, Value> {
    let mut out = match (options, existing) {
        (SetOptions::Merge, Some(data)) => data.clone(),
        _ => Map::new(),
    };
    for (key, write) in fields.iter() {
        let current = out.get(key).cloned();
        match resolve(current.as_ref(), write, now_ms) {
            Some(Value::Object(incoming)) if options == SetOptions::Merge => {
                match out.get_mut(key) {
                    Some(Value::Object(existing)) => merge_into(existing, incoming),
                    _ => {
                        out.insert(key.clone(), Value::Object(incoming));
                    }
                }
            }
            Some(v) => {
                out.insert(key.clone(), v);
            }
            None => {
                out.remove(key);
            }
        }
    }
    out
}

/// Result of `update`: dotted-path patches on top of the existing data.
pub(crate) fn apply_update(
    existing: &Map<String, Value>,
    fields: &Fields,
    now_ms: i64,
) -> Map<String, Value> {
    let mut out = existing.clone();
    for (path, write) in fields.iter() {
        let current = hearth_store_traits::document::get_path(&out, path).cloned();
        match resolve(current.as_ref(), write, now_ms) {
            Some(v) => *get_path_mut(&mut out, path) = v,
            None => remove_path(&mut out, path),
        }
    }
    out
}
