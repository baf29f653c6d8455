//! Query description and the reference evaluation rules
//!
//! Backends are free to execute queries however they like, but results must
//! match what [`Query::evaluate`] produces over the same documents.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::document::get_path;
use crate::{DocRef, Document};

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Field equals the value
    Equal,
    /// Field is an array containing the value
    ArrayContains,
    /// Field sorts strictly before the value
    LessThan,
    /// Field sorts strictly after the value
    GreaterThan,
}

/// A single field predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Dotted field path
    pub field: String,
    /// Comparison
    pub op: FilterOp,
    /// Right-hand side
    pub value: Value,
}

impl Filter {
    fn matches(&self, data: &Map<String, Value>) -> bool {
        let Some(field) = get_path(data, &self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Equal => compare_values(field, &self.value) == Ordering::Equal,
            FilterOp::ArrayContains => field
                .as_array()
                .map(|items| items.iter().any(|v| v == &self.value))
                .unwrap_or(false),
            FilterOp::LessThan => {
                same_kind(field, &self.value)
                    && compare_values(field, &self.value) == Ordering::Less
            }
            FilterOp::GreaterThan => {
                same_kind(field, &self.value)
                    && compare_values(field, &self.value) == Ordering::Greater
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

/// Ordering clause.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Dotted field path
    pub field: String,
    /// Direction
    pub direction: Direction,
}

/// Position in an ordered result set.
///
/// With `doc_id` set the cursor sits on one document, so documents sharing its
/// order value are split by id the same way results are tie-broken.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    /// Order-field value
    pub value: Value,
    /// Tie-break document id
    pub doc_id: Option<String>,
}

impl Cursor {
    fn position_of(&self, value: &Value, id: &str) -> Ordering {
        compare_values(value, &self.value).then_with(|| match &self.doc_id {
            Some(doc_id) => id.cmp(doc_id.as_str()),
            None => Ordering::Equal,
        })
    }
}

/// A filtered, ordered, optionally paginated query over one collection.
///
/// Documents lacking the `order_by` field are excluded, and results are
/// tie-broken by document id so the output is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection path
    pub collection: String,
    /// Predicates, all of which must hold
    pub filters: Vec<Filter>,
    /// Optional ordering
    pub order_by: Option<OrderBy>,
    /// Cursor: only documents strictly after this position (in query order)
    pub start_after: Option<Cursor>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl Query {
    /// Everything in `collection`.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: vec![],
            order_by: None,
            start_after: None,
            limit: None,
        }
    }

    /// Add an equality predicate.
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Equal, value)
    }

    /// Add an array-membership predicate.
    pub fn where_array_contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::ArrayContains, value)
    }

    /// Add an arbitrary predicate.
    pub fn filter(
        mut self,
        field: impl Into<String>,
        op: FilterOp,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Set the ordering.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Start after every document whose order value is `value`.
    pub fn start_after(mut self, value: impl Into<Value>) -> Self {
        self.start_after = Some(Cursor {
            value: value.into(),
            doc_id: None,
        });
        self
    }

    /// Start right after the document `doc_id`, whose order value is `value`.
    pub fn start_after_doc(mut self, value: impl Into<Value>, doc_id: impl Into<String>) -> Self {
        self.start_after = Some(Cursor {
            value: value.into(),
            doc_id: Some(doc_id.into()),
        });
        self
    }

    /// Cap the result size.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `doc` lives in this query's collection and passes every filter.
    pub fn matches(&self, reference: &DocRef, data: &Map<String, Value>) -> bool {
        if reference.collection != self.collection {
            return false;
        }
        if let Some(order) = &self.order_by {
            if get_path(data, &order.field).is_none() {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(data))
    }

    /// Apply filters, ordering, cursor and limit to a candidate set.
    pub fn evaluate(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs
            .into_iter()
            .filter(|d| self.matches(&d.reference, &d.data))
            .collect();

        match &self.order_by {
            Some(order) => {
                out.sort_by(|a, b| {
                    let ord = compare_opt(a.get(&order.field), b.get(&order.field))
                        .then_with(|| a.id().cmp(b.id()));
                    match order.direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                });
                if let Some(cursor) = &self.start_after {
                    out.retain(|d| {
                        let Some(v) = d.get(&order.field) else {
                            return false;
                        };
                        let ord = cursor.position_of(v, d.id());
                        match order.direction {
                            Direction::Ascending => ord == Ordering::Greater,
                            Direction::Descending => ord == Ordering::Less,
                        }
                    });
                }
            }
            None => out.sort_by(|a, b| a.id().cmp(b.id())),
        }

        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

fn compare_opt(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    kind_rank(a) == kind_rank(b)
}

/// Total order over JSON values: null < bool < number < string < array < object,
/// then natural order within a kind.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(collection: &str, id: &str, data: Value) -> Document {
        Document {
            reference: DocRef::new(collection, id),
            data: data.as_object().cloned().unwrap(),
            has_pending_writes: false,
        }
    }

    fn messages() -> Vec<Document> {
        (1..=25)
            .map(|i| {
                doc(
                    "chats/c1/messages",
                    &format!("m{i:02}"),
                    json!({"createdAt": i * 1000, "content": format!("msg {i}")}),
                )
            })
            .collect()
    }

    #[test]
    fn newest_page_descending() {
        let q = Query::collection("chats/c1/messages")
            .order_by("createdAt", Direction::Descending)
            .limit(10);
        let out = q.evaluate(messages());
        let ids: Vec<&str> = out.iter().map(|d| d.id()).collect();
        assert_eq!(ids.first(), Some(&"m25"));
        assert_eq!(ids.last(), Some(&"m16"));
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn start_after_in_descending_order_is_strictly_older() {
        let q = Query::collection("chats/c1/messages")
            .order_by("createdAt", Direction::Descending)
            .start_after(16_000)
            .limit(10);
        let out = q.evaluate(messages());
        assert_eq!(out.len(), 10);
        assert_eq!(out[0].id(), "m15");
        assert_eq!(out[9].id(), "m06");

        let tail = Query::collection("chats/c1/messages")
            .order_by("createdAt", Direction::Descending)
            .start_after(6_000)
            .limit(10)
            .evaluate(messages());
        assert_eq!(tail.len(), 5);
    }

    #[test]
    fn document_cursor_splits_equal_timestamps() {
        let docs = vec![
            doc("m", "a", json!({"createdAt": 1000})),
            doc("m", "b", json!({"createdAt": 1000})),
            doc("m", "c", json!({"createdAt": 1000})),
            doc("m", "d", json!({"createdAt": 2000})),
        ];
        let ids = |q: Query| -> Vec<String> {
            q.evaluate(docs.clone())
                .iter()
                .map(|d| d.id().to_string())
                .collect()
        };
        let older = Query::collection("m").order_by("createdAt", Direction::Descending);
        assert_eq!(ids(older.clone().start_after_doc(1000, "b")), vec!["a"]);
        assert_eq!(ids(older.clone().start_after_doc(2000, "d")), vec!["c", "b", "a"]);
        // A bare value skips the whole tie group.
        assert!(ids(older.start_after(1000)).is_empty());

        let newer = Query::collection("m").order_by("createdAt", Direction::Ascending);
        assert_eq!(ids(newer.start_after_doc(1000, "b")), vec!["c", "d"]);
    }

    #[test]
    fn array_contains_and_collection_scoping() {
        let docs = vec![
            doc("chats", "a", json!({"participants": ["alice", "bob"]})),
            doc("chats", "b", json!({"participants": ["carol", "bob"]})),
            doc("other", "c", json!({"participants": ["alice"]})),
        ];
        let q = Query::collection("chats").where_array_contains("participants", "alice");
        let out = q.evaluate(docs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), "a");
    }

    #[test]
    fn ordering_excludes_documents_missing_the_field() {
        let docs = vec![
            doc("m", "a", json!({"createdAt": 2})),
            doc("m", "b", json!({})),
            doc("m", "c", json!({"createdAt": 1})),
        ];
        let out = Query::collection("m")
            .order_by("createdAt", Direction::Ascending)
            .evaluate(docs);
        let ids: Vec<&str> = out.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn range_filters_do_not_cross_kinds() {
        let docs = vec![
            doc("m", "num", json!({"v": 5})),
            doc("m", "str", json!({"v": "5"})),
        ];
        let out = Query::collection("m")
            .filter("v", FilterOp::LessThan, 10)
            .evaluate(docs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), "num");
    }
}
