//! Field-level snapshot diffing
//!
//! Pure functions over [`Snapshot`] pairs. A [`FieldDiff`] is a derived
//! view, computed on demand from the stored before/after snapshots; it is
//! never persisted. Values compare by deep structural equality, so nested
//! objects and arrays match by content, and `null` is distinct from an
//! absent field (`old`/`new` being `None` means absent on that side).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use ger_common::Snapshot;

use crate::registry::EntityType;

/// One changed field between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    /// Value before the change; `None` when the field was absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<JsonValue>,
    /// Value after the change; `None` when the field was removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<JsonValue>,
}

/// Compute the field-level delta between two snapshots.
///
/// Iterates the union of field names present in either snapshot and emits a
/// [`FieldDiff`] for every field whose values are structurally unequal,
/// including null-vs-absent and type changes. Output is ordered
/// lexicographically by field name; presentation-order concerns belong to
/// [`order_for_entity`].
pub fn diff(before: &Snapshot, after: &Snapshot) -> Vec<FieldDiff> {
    let fields: BTreeSet<&str> = before.field_names().chain(after.field_names()).collect();

    let mut diffs = Vec::new();
    for field in fields {
        match (before.get(field), after.get(field)) {
            (Some(old), Some(new)) if old == new => {},
            (None, None) => {},
            (old, new) => diffs.push(FieldDiff {
                field: field.to_string(),
                old: old.cloned(),
                new: new.cloned(),
            }),
        }
    }
    diffs
}

/// Re-apply a delta to a base snapshot.
///
/// For every diff entry the new value replaces the old one; a `None` new
/// value removes the field. `apply(before, diff(before, after)) == after`
/// for any snapshot pair.
pub fn apply(base: &Snapshot, diffs: &[FieldDiff]) -> Snapshot {
    let mut result = base.clone();
    for entry in diffs {
        match &entry.new {
            Some(value) => {
                result.set(entry.field.as_str(), value.clone());
            },
            None => {
                result.remove(&entry.field);
            },
        }
    }
    result
}

/// Stable presentation order for diffs of one entity type: declared schema
/// field order first, unknown fields after in lexicographic order.
pub fn order_for_entity(mut diffs: Vec<FieldDiff>, entity_type: EntityType) -> Vec<FieldDiff> {
    let declared = entity_type.declared_fields();
    let rank = |field: &str| {
        declared
            .iter()
            .position(|f| *f == field)
            .unwrap_or(declared.len())
    };
    diffs.sort_by(|a, b| {
        rank(&a.field)
            .cmp(&rank(&b.field))
            .then_with(|| a.field.cmp(&b.field))
    });
    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn snapshot(pairs: &[(&str, JsonValue)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_single_changed_field() {
        let before = snapshot(&[("name", json!("A")), ("active", json!(true))]);
        let after = snapshot(&[("name", json!("B")), ("active", json!(true))]);

        let diffs = diff(&before, &after);

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "name");
        assert_eq!(diffs[0].old, Some(json!("A")));
        assert_eq!(diffs[0].new, Some(json!("B")));
    }

    #[test]
    fn test_self_diff_is_empty() {
        let base = snapshot(&[("name", json!("A")), ("meta", json!({"k": [1, 2]}))]);
        assert!(diff(&base, &base).is_empty());
    }

    #[test]
    fn test_null_differs_from_absent() {
        let before = snapshot(&[("code", JsonValue::Null)]);
        let after = snapshot(&[]);

        let diffs = diff(&before, &after);

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].old, Some(JsonValue::Null));
        assert_eq!(diffs[0].new, None);
    }

    #[test]
    fn test_type_change_is_a_diff() {
        let before = snapshot(&[("code", json!("7"))]);
        let after = snapshot(&[("code", json!(7))]);

        let diffs = diff(&before, &after);

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].old, Some(json!("7")));
        assert_eq!(diffs[0].new, Some(json!(7)));
    }

    #[test]
    fn test_nested_values_compare_structurally() {
        let before = snapshot(&[("meta", json!({"tags": ["a", "b"], "n": 1}))]);
        let same = snapshot(&[("meta", json!({"n": 1, "tags": ["a", "b"]}))]);
        let changed = snapshot(&[("meta", json!({"tags": ["a"], "n": 1}))]);

        assert!(diff(&before, &same).is_empty());
        assert_eq!(diff(&before, &changed).len(), 1);
    }

    #[test]
    fn test_added_field() {
        let before = snapshot(&[("name", json!("A"))]);
        let after = snapshot(&[("name", json!("A")), ("code", json!("01"))]);

        let diffs = diff(&before, &after);

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "code");
        assert_eq!(diffs[0].old, None);
        assert_eq!(diffs[0].new, Some(json!("01")));
    }

    #[test]
    fn test_order_for_entity_uses_declared_order() {
        let before = snapshot(&[
            ("active", json!(true)),
            ("name", json!("A")),
            ("zz_extra", json!(1)),
            ("aa_extra", json!(1)),
        ]);
        let after = snapshot(&[
            ("active", json!(false)),
            ("name", json!("B")),
            ("zz_extra", json!(2)),
            ("aa_extra", json!(2)),
        ]);

        let ordered = order_for_entity(diff(&before, &after), EntityType::Sphere);
        let fields: Vec<_> = ordered.iter().map(|d| d.field.as_str()).collect();

        // Declared sphere order is id, name, code, active; unknown fields
        // follow lexicographically.
        assert_eq!(fields, vec!["name", "active", "aa_extra", "zz_extra"]);
    }

    fn json_value_strategy() -> impl Strategy<Value = JsonValue> {
        prop_oneof![
            Just(JsonValue::Null),
            any::<bool>().prop_map(JsonValue::from),
            any::<i64>().prop_map(JsonValue::from),
            "[a-z]{0,8}".prop_map(JsonValue::from),
            Just(json!({"nested": [1, "x", null]})),
        ]
    }

    fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
        proptest::collection::btree_map(
            prop_oneof![
                Just("name".to_string()),
                Just("code".to_string()),
                Just("active".to_string()),
                Just("tax_code".to_string()),
                Just("meta".to_string()),
            ],
            json_value_strategy(),
            0..5,
        )
        .prop_map(|map| map.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_apply_diff_reconstructs_after(
            before in snapshot_strategy(),
            after in snapshot_strategy(),
        ) {
            let delta = diff(&before, &after);
            prop_assert_eq!(apply(&before, &delta), after);
        }

        #[test]
        fn prop_self_diff_is_empty(base in snapshot_strategy()) {
            prop_assert!(diff(&base, &base).is_empty());
        }
    }
}
