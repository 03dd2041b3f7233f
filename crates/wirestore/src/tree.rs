//! The JSON value tree and its mutation primitives.
//!
//! The tree is a plain [`serde_json::Value`] where interior nodes are
//! objects. Absence is represented uniformly: deleting the last child of a
//! node prunes the now-empty node, so `get` never observes hollow `{}`
//! shells left behind by removals.

use serde_json::{json, Map, Value};

/// Sentinel value replaced with the store's logical clock at commit time.
///
/// Writers that want a server-assigned timestamp embed this sentinel in
/// the value they write; the store substitutes the current clock reading
/// before the value lands in the tree. Client clocks never enter the tree.
#[must_use]
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// Recursively replaces every [`server_timestamp`] sentinel in `value`
/// with `now_ms`.
pub fn resolve_timestamps(value: &mut Value, now_ms: u64) {
    if *value == server_timestamp() {
        *value = json!(now_ms);
        return;
    }
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                resolve_timestamps(child, now_ms);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                resolve_timestamps(child, now_ms);
            }
        }
        _ => {}
    }
}

use crate::path::StorePath;

/// The store's value tree.
#[derive(Debug, Default)]
pub struct Tree {
    root: Value,
}

impl Tree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self { root: Value::Null }
    }

    /// Returns the value at `path`, or `None` when the subtree is absent.
    #[must_use]
    pub fn get(&self, path: &StorePath) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = node.as_object()?.get(segment)?;
        }
        if node.is_null() {
            None
        } else {
            Some(node)
        }
    }

    /// Writes `value` at `path`, or deletes the subtree when `value` is
    /// `None` (or JSON null). Intermediate objects are created on write
    /// and pruned on delete.
    pub fn set(&mut self, path: &StorePath, value: Option<Value>) {
        match value {
            Some(v) if !v.is_null() => insert(&mut self.root, path.segments(), v),
            _ => {
                remove(&mut self.root, path.segments());
                if self.root.as_object().is_some_and(Map::is_empty) {
                    self.root = Value::Null;
                }
            }
        }
    }

    /// Shallow-merges `fields` into the object at `path`.
    ///
    /// A `null` field deletes that key. When every key ends up deleted the
    /// whole node is removed. A non-object value at `path` is replaced.
    pub fn patch(&mut self, path: &StorePath, fields: Map<String, Value>) {
        let mut merged = match self.get(path) {
            Some(Value::Object(existing)) => existing.clone(),
            _ => Map::new(),
        };
        for (key, value) in fields {
            if value.is_null() {
                merged.remove(&key);
            } else {
                merged.insert(key, value);
            }
        }
        if merged.is_empty() {
            self.set(path, None);
        } else {
            self.set(path, Some(Value::Object(merged)));
        }
    }

    /// The immediate children of the node at `path`, sorted by key.
    ///
    /// Leaf and absent nodes have no children.
    #[must_use]
    pub fn children(&self, path: &StorePath) -> Vec<(String, Value)> {
        match self.get(path) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of immediate children at `path`.
    #[must_use]
    pub fn child_count(&self, path: &StorePath) -> usize {
        match self.get(path) {
            Some(Value::Object(map)) => map.len(),
            _ => 0,
        }
    }
}

fn insert(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        insert(child, rest, value);
    }
}

/// Removes the subtree at `segments` under `node`. Returns `true` when
/// `node` itself became empty and should be pruned by the caller.
fn remove(node: &mut Value, segments: &[String]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *node = Value::Null;
        return true;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if let Some(child) = map.get_mut(head) {
        if remove(child, rest) {
            map.remove(head);
        }
    }
    map.is_empty()
}
