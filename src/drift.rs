//! Structural drift detection between desired and observed documents.
//!
//! This module computes the difference between two JSON-like documents
//! (maps, sequences, scalars). Sequences are compared as multisets:
//! ordering differences are never reported as drift, but repeated elements
//! present on one side and absent on the other are surfaced with their
//! multiplicity. The output is a designed, JSON-safe contract: type
//! markers are rendered as string names, never internal types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine for computing structural drift.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriftEngine;

/// The full drift between two documents, keyed by field path.
///
/// Paths are dotted from the document root `$` (e.g.
/// `$.policy_document.Statement`). Sequence-level differences are reported
/// at the sequence's own path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriftResult {
    /// Scalar values that changed without changing type.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub values_changed: BTreeMap<String, ValueChange>,
    /// Values whose JSON type changed.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub type_changes: BTreeMap<String, TypeChange>,
    /// Items present in the desired document but not in the existing one.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub items_added: BTreeMap<String, Vec<Value>>,
    /// Items present in the existing document but not in the desired one.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub items_removed: BTreeMap<String, Vec<Value>>,
}

/// A scalar value change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueChange {
    /// The existing (live) value.
    pub old_value: Value,
    /// The desired value.
    pub new_value: Value,
}

/// A change in JSON type, with type names as plain strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeChange {
    /// Name of the existing value's type.
    pub old_type: String,
    /// Name of the desired value's type.
    pub new_type: String,
    /// The existing value.
    pub old_value: Value,
    /// The desired value.
    pub new_value: Value,
}

impl DriftResult {
    /// Returns true if no drift was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values_changed.is_empty()
            && self.type_changes.is_empty()
            && self.items_added.is_empty()
            && self.items_removed.is_empty()
    }

    /// Returns the total number of drifted paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values_changed.len()
            + self.type_changes.len()
            + self.items_added.len()
            + self.items_removed.len()
    }
}

/// Returns the JSON type name of a value as a plain string.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl DriftEngine {
    /// Creates a new drift engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the drift from `existing` (live state) to `desired`.
    ///
    /// An empty result means the two documents are structurally equal up
    /// to sequence ordering.
    #[must_use]
    pub fn diff(&self, existing: &Value, desired: &Value) -> DriftResult {
        let mut result = DriftResult::default();
        diff_value("$", existing, desired, &mut result);
        result
    }
}

/// Recursive comparison of two values at a path.
fn diff_value(path: &str, existing: &Value, desired: &Value, out: &mut DriftResult) {
    match (existing, desired) {
        (Value::Object(existing_map), Value::Object(desired_map)) => {
            for (key, existing_value) in existing_map {
                let child = format!("{path}.{key}");
                match desired_map.get(key) {
                    Some(desired_value) => diff_value(&child, existing_value, desired_value, out),
                    None => {
                        out.items_removed.insert(child, vec![existing_value.clone()]);
                    }
                }
            }
            for (key, desired_value) in desired_map {
                if !existing_map.contains_key(key) {
                    let child = format!("{path}.{key}");
                    out.items_added.insert(child, vec![desired_value.clone()]);
                }
            }
        }
        (Value::Array(existing_items), Value::Array(desired_items)) => {
            diff_sequence(path, existing_items, desired_items, out);
        }
        _ => {
            if json_type_name(existing) == json_type_name(desired) {
                if existing != desired {
                    out.values_changed.insert(
                        path.to_string(),
                        ValueChange {
                            old_value: existing.clone(),
                            new_value: desired.clone(),
                        },
                    );
                }
            } else {
                out.type_changes.insert(
                    path.to_string(),
                    TypeChange {
                        old_type: json_type_name(existing).to_string(),
                        new_type: json_type_name(desired).to_string(),
                        old_value: existing.clone(),
                        new_value: desired.clone(),
                    },
                );
            }
        }
    }
}

/// Order-insensitive multiset comparison of two sequences.
///
/// Elements are counted by their canonical form; surplus occurrences on
/// either side are reported individually so repetition is never collapsed.
fn diff_sequence(path: &str, existing: &[Value], desired: &[Value], out: &mut DriftResult) {
    let mut existing_counts: BTreeMap<String, (u32, &Value)> = BTreeMap::new();
    for item in existing {
        let entry = existing_counts.entry(canonical_form(item)).or_insert((0, item));
        entry.0 += 1;
    }

    let mut desired_counts: BTreeMap<String, (u32, &Value)> = BTreeMap::new();
    for item in desired {
        let entry = desired_counts.entry(canonical_form(item)).or_insert((0, item));
        entry.0 += 1;
    }

    let mut added = Vec::new();
    for (key, (desired_count, item)) in &desired_counts {
        let existing_count = existing_counts.get(key).map_or(0, |(n, _)| *n);
        for _ in existing_count..*desired_count {
            added.push((*item).clone());
        }
    }

    let mut removed = Vec::new();
    for (key, (existing_count, item)) in &existing_counts {
        let desired_count = desired_counts.get(key).map_or(0, |(n, _)| *n);
        for _ in desired_count..*existing_count {
            removed.push((*item).clone());
        }
    }

    if !added.is_empty() {
        out.items_added.insert(path.to_string(), added);
    }
    if !removed.is_empty() {
        out.items_removed.insert(path.to_string(), removed);
    }
}

/// Canonical string form of a value, insensitive to sequence ordering at
/// every nesting level. Object keys are already ordered by `serde_json`'s
/// map representation.
fn canonical_form(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().map(canonical_form).collect();
            parts.sort();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}:{}", canonical_form(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_documents_have_no_drift() {
        let doc = json!({
            "Version": "2012-10-17",
            "Statement": [
                {"Effect": "Allow", "Action": ["s3:GetObject", "s3:ListBucket"]},
                {"Effect": "Deny", "Action": "iam:*"}
            ]
        });
        let engine = DriftEngine::new();
        assert!(engine.diff(&doc, &doc).is_empty());
    }

    #[test]
    fn test_statement_order_is_not_drift() {
        let existing = json!({
            "Statement": [
                {"Effect": "Allow", "Action": ["s3:ListBucket", "s3:GetObject"]},
                {"Effect": "Deny", "Action": "iam:*"}
            ]
        });
        let desired = json!({
            "Statement": [
                {"Effect": "Deny", "Action": "iam:*"},
                {"Effect": "Allow", "Action": ["s3:GetObject", "s3:ListBucket"]}
            ]
        });
        let result = DriftEngine::new().diff(&existing, &desired);
        assert!(result.is_empty(), "reordered statements reported as drift: {result:?}");
    }

    #[test]
    fn test_repeated_elements_are_counted() {
        let existing = json!(["a", "a", "b"]);
        let desired = json!(["a", "b"]);
        let result = DriftEngine::new().diff(&existing, &desired);
        assert_eq!(result.items_removed["$"], vec![json!("a")]);
        assert!(result.items_added.is_empty());
    }

    #[test]
    fn test_scalar_change() {
        let existing = json!({"path": "/"});
        let desired = json!({"path": "/engineering/"});
        let result = DriftEngine::new().diff(&existing, &desired);
        let change = &result.values_changed["$.path"];
        assert_eq!(change.old_value, json!("/"));
        assert_eq!(change.new_value, json!("/engineering/"));
    }

    #[test]
    fn test_type_change_uses_string_names() {
        let existing = json!({"Action": "s3:*"});
        let desired = json!({"Action": ["s3:GetObject"]});
        let result = DriftEngine::new().diff(&existing, &desired);
        let change = &result.type_changes["$.Action"];
        assert_eq!(change.old_type, "string");
        assert_eq!(change.new_type, "array");
        // The whole result must survive JSON serialization.
        assert!(serde_json::to_string(&result).is_ok());
    }

    #[test]
    fn test_added_and_removed_map_keys() {
        let existing = json!({"a": 1, "b": 2});
        let desired = json!({"b": 2, "c": 3});
        let result = DriftEngine::new().diff(&existing, &desired);
        assert_eq!(result.items_removed["$.a"], vec![json!(1)]);
        assert_eq!(result.items_added["$.c"], vec![json!(3)]);
        assert!(result.values_changed.is_empty());
    }

    #[test]
    fn test_nested_reordering_is_ignored() {
        let existing = json!({"Statement": [{"Action": ["a", "b"]}]});
        let desired = json!({"Statement": [{"Action": ["b", "a"]}]});
        let result = DriftEngine::new().diff(&existing, &desired);
        assert!(result.is_empty());
    }
}
