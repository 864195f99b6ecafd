//! Snapshot diffing for trace mode.

use serde::Serialize;
use serde_json::Value;

use crate::LocalsSnapshot;

/// How a variable changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// Present only in the newer snapshot.
    Created,
    /// Present in both with differing projections.
    Modified,
    /// Present only in the older snapshot.
    Deleted,
}

/// One variable delta.
///
/// `Modified` carries only the new value; the consumer has already seen
/// the prior state in an earlier event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableChange {
    /// Variable name.
    pub name: String,
    /// The change kind.
    #[serde(rename = "changeKind")]
    pub kind: ChangeKind,
    /// New projection for created and modified entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    /// Old projection for deleted entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
}

/// Diffs two locals snapshots by JSON projection.
///
/// Produces at most one change per name: `created` for names only in
/// `curr`, `deleted` for names only in `prev`, `modified` when the
/// structural projection differs.
pub fn diff_locals(prev: &LocalsSnapshot, curr: &LocalsSnapshot) -> Vec<VariableChange> {
    let mut changes = Vec::new();

    for (name, value) in curr {
        match prev.get(name) {
            None => changes.push(VariableChange {
                name: name.clone(),
                kind: ChangeKind::Created,
                new_value: Some(value.to_json()),
                old_value: None,
            }),
            Some(previous) => {
                let new_json = value.to_json();
                if previous.to_json() != new_json {
                    changes.push(VariableChange {
                        name: name.clone(),
                        kind: ChangeKind::Modified,
                        new_value: Some(new_json),
                        old_value: None,
                    });
                }
            }
        }
    }

    for (name, value) in prev {
        if !curr.contains_key(name) {
            changes.push(VariableChange {
                name: name.clone(),
                kind: ChangeKind::Deleted,
                new_value: None,
                old_value: Some(value.to_json()),
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Primitive, VariableValue};

    fn snapshot(entries: &[(&str, Primitive)]) -> LocalsSnapshot {
        entries
            .iter()
            .map(|(name, primitive)| {
                (name.to_string(), VariableValue::primitive(primitive.clone(), None))
            })
            .collect()
    }

    #[test]
    fn test_diff_of_identical_snapshots_is_empty() {
        let snap = snapshot(&[("i", Primitive::Int(1)), ("name", Primitive::Str("a".into()))]);
        assert!(diff_locals(&snap, &snap).is_empty());
    }

    #[test]
    fn test_diff_reports_each_kind_once() {
        let prev = snapshot(&[("kept", Primitive::Int(1)), ("gone", Primitive::Int(2))]);
        let curr = snapshot(&[("kept", Primitive::Int(5)), ("fresh", Primitive::Bool(true))]);

        let changes = diff_locals(&prev, &curr);
        assert_eq!(changes.len(), 3);

        let by_name = |name: &str| changes.iter().find(|c| c.name == name).unwrap();
        assert_eq!(by_name("kept").kind, ChangeKind::Modified);
        assert_eq!(by_name("kept").new_value.as_ref().unwrap()["value"], 5);
        assert!(by_name("kept").old_value.is_none());
        assert_eq!(by_name("fresh").kind, ChangeKind::Created);
        assert_eq!(by_name("gone").kind, ChangeKind::Deleted);
        assert_eq!(by_name("gone").old_value.as_ref().unwrap()["value"], 2);
    }

    #[test]
    fn test_modified_requires_projection_difference() {
        // Same projection through different construction paths: no change.
        let prev = snapshot(&[("x", Primitive::Str("7".into()))]);
        let curr = snapshot(&[("x", Primitive::Raw("7".into()))]);
        assert!(diff_locals(&prev, &curr).is_empty());
    }
}
