//! Flattened leaf listings and diffs between them.
//!
//! A leaf listing maps every scalar (and every empty struct or list) of a
//! document to its path, in lexicographic path order. Two listings diff
//! into added, removed and changed entries.

use crate::expr::to_json;
use crate::path::Path;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single leaf of a flattened document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    /// Rendered path, e.g. `components.web.ports[0].port`
    pub path: String,
    /// Leaf value as JSON; incomplete values render as expressions
    pub value: serde_json::Value,
}

/// Flatten a value into sorted leaves
#[must_use]
pub fn leaves_of(value: &Value) -> Vec<Leaf> {
    let mut out = Vec::new();
    collect(value, &Path::root(), &mut out);
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn collect(value: &Value, at: &Path, out: &mut Vec<Leaf>) {
    match value {
        Value::Struct(s) if !s.fields.is_empty() => {
            for (name, field) in &s.fields {
                collect(&field.value, &at.field(name.as_str()), out);
            }
        }
        Value::List(items) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                collect(item, &at.index(i), out);
            }
        }
        other => out.push(Leaf {
            path: at.to_string(),
            value: to_json(other),
        }),
    }
}

/// One difference between two leaf listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeafChange {
    /// Leaf only present on the right
    Added {
        /// Leaf path
        path: String,
        /// New value
        value: serde_json::Value,
    },
    /// Leaf only present on the left
    Removed {
        /// Leaf path
        path: String,
        /// Old value
        value: serde_json::Value,
    },
    /// Leaf present on both sides with different values
    Changed {
        /// Leaf path
        path: String,
        /// Old value
        old: serde_json::Value,
        /// New value
        new: serde_json::Value,
    },
}

impl LeafChange {
    /// Path of the changed leaf
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Changed { path, .. } => {
                path
            }
        }
    }
}

/// Summary counts of a leaf diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Number of added leaves
    pub added_count: usize,
    /// Number of removed leaves
    pub removed_count: usize,
    /// Number of changed leaves
    pub changed_count: usize,
}

impl DiffSummary {
    /// Count the entries of a diff
    #[must_use]
    pub fn of(changes: &[LeafChange]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change {
                LeafChange::Added { .. } => summary.added_count += 1,
                LeafChange::Removed { .. } => summary.removed_count += 1,
                LeafChange::Changed { .. } => summary.changed_count += 1,
            }
        }
        summary
    }

    /// Whether the two sides were identical
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_count + self.removed_count + self.changed_count == 0
    }
}

/// Diff two leaf listings, ordered by path
#[must_use]
pub fn diff_leaves(old: &[Leaf], new: &[Leaf]) -> Vec<LeafChange> {
    let before: BTreeMap<&str, &serde_json::Value> =
        old.iter().map(|l| (l.path.as_str(), &l.value)).collect();
    let after: BTreeMap<&str, &serde_json::Value> =
        new.iter().map(|l| (l.path.as_str(), &l.value)).collect();

    let mut changes = Vec::new();
    for (path, old_value) in &before {
        match after.get(path) {
            None => changes.push(LeafChange::Removed {
                path: (*path).to_string(),
                value: (*old_value).clone(),
            }),
            Some(new_value) if new_value != old_value => changes.push(LeafChange::Changed {
                path: (*path).to_string(),
                old: (*old_value).clone(),
                new: (*new_value).clone(),
            }),
            Some(_) => {}
        }
    }
    for (path, new_value) in &after {
        if !before.contains_key(path) {
            changes.push(LeafChange::Added {
                path: (*path).to_string(),
                value: (*new_value).clone(),
            });
        }
    }
    changes.sort_by(|a, b| a.path().cmp(b.path()));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::from_json;
    use serde_json::json;

    fn leaves(json: serde_json::Value) -> Vec<Leaf> {
        leaves_of(&from_json(&json).unwrap())
    }

    #[test]
    fn test_leaves_sorted_by_path() {
        let out = leaves(json!({"b": {"y": 1, "x": [true, "s"]}, "a": {}}));
        let paths: Vec<_> = out.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b.x[0]", "b.x[1]", "b.y"]);
        assert_eq!(out[0].value, json!({}));
        assert_eq!(out[3].value, json!(1));
    }

    #[test]
    fn test_incomplete_leaf_renders_expression() {
        let out = leaves(json!({"image": "${string}"}));
        assert_eq!(out[0].value, json!("${string}"));
    }

    #[test]
    fn test_diff_leaves() {
        let old = leaves(json!({"a": 1, "b": 2, "c": 3}));
        let new = leaves(json!({"a": 1, "b": 5, "d": 4}));
        let changes = diff_leaves(&old, &new);
        assert_eq!(
            changes,
            vec![
                LeafChange::Changed {
                    path: "b".to_string(),
                    old: json!(2),
                    new: json!(5)
                },
                LeafChange::Removed {
                    path: "c".to_string(),
                    value: json!(3)
                },
                LeafChange::Added {
                    path: "d".to_string(),
                    value: json!(4)
                },
            ]
        );
        let summary = DiffSummary::of(&changes);
        assert_eq!(summary.added_count, 1);
        assert_eq!(summary.removed_count, 1);
        assert_eq!(summary.changed_count, 1);
    }

    #[test]
    fn test_identical_listings() {
        let same = leaves(json!({"a": [1, 2]}));
        let changes = diff_leaves(&same, &same);
        assert!(changes.is_empty());
        assert!(DiffSummary::of(&changes).is_empty());
    }
}
