//! Common types used across GER
//!
//! The central type here is [`Snapshot`]: the full field-value state of a
//! governed record at one moment. Snapshots are what the mutation recorder
//! persists into the audit trail, so they must survive serialization
//! faithfully, in particular the distinction between a field that is
//! present with a `null` value and a field that is absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::CommonError;

/// Maximum accepted length for a snapshot field name.
pub const MAX_FIELD_NAME_LEN: usize = 64;

/// Full field-value state of a record instance at one moment.
///
/// An ordered mapping of field name to scalar or nested JSON value. Two
/// snapshots of the same record are structurally comparable field by field;
/// iteration order is deterministic (lexicographic by field name).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, JsonValue>);

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: JsonValue) -> &mut Self {
        self.0.insert(field.into(), value);
        self
    }

    /// Get a field value. `None` means the field is absent, which is not
    /// the same as the field holding JSON `null`.
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    /// Remove a field entirely.
    pub fn remove(&mut self, field: &str) -> Option<JsonValue> {
        self.0.remove(field)
    }

    /// Whether the field is present (possibly with a `null` value).
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Field names in deterministic (lexicographic) order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate `(field, value)` pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate every field name against the identifier rules.
    ///
    /// Snapshot field names end up as column identifiers in generated SQL,
    /// so anything that is not a plain lowercase identifier is rejected at
    /// the boundary.
    pub fn validate_field_names(&self) -> Result<(), CommonError> {
        match self.first_invalid_field_name() {
            Some(field) => Err(CommonError::InvalidFieldName(field.to_string())),
            None => Ok(()),
        }
    }

    /// First field name that fails the identifier rules, if any.
    pub fn first_invalid_field_name(&self) -> Option<&str> {
        self.field_names().find(|field| !is_valid_field_name(field))
    }
}

impl FromIterator<(String, JsonValue)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, JsonValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Whether `name` is a valid snapshot field name: non-empty, at most
/// [`MAX_FIELD_NAME_LEN`] bytes, `[a-z_][a-z0-9_]*`.
pub fn is_valid_field_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FIELD_NAME_LEN {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let mut snapshot = Snapshot::new();
        snapshot.set("name", json!("Central Bank")).set("active", json!(true));

        assert_eq!(snapshot.get("name"), Some(&json!("Central Bank")));
        assert_eq!(snapshot.get("active"), Some(&json!(true)));
        assert_eq!(snapshot.get("missing"), None);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_null_is_not_absent() {
        let mut snapshot = Snapshot::new();
        snapshot.set("code", JsonValue::Null);

        assert!(snapshot.contains("code"));
        assert_eq!(snapshot.get("code"), Some(&JsonValue::Null));
        assert!(!snapshot.contains("name"));
    }

    #[test]
    fn test_deterministic_field_order() {
        let mut snapshot = Snapshot::new();
        snapshot.set("zeta", json!(1)).set("alpha", json!(2)).set("mid", json!(3));

        let names: Vec<_> = snapshot.field_names().collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_serde_round_trip_preserves_null_vs_absent() {
        let mut snapshot = Snapshot::new();
        snapshot.set("name", json!("A")).set("code", JsonValue::Null);

        let encoded = serde_json::to_string(&snapshot).unwrap();
        let decoded: Snapshot = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, snapshot);
        assert!(decoded.contains("code"));
        assert!(!decoded.contains("description"));
    }

    #[test]
    fn test_valid_field_names() {
        for name in ["name", "sphere_id", "_internal", "a1", "tax_code_2"] {
            assert!(is_valid_field_name(name), "{name:?} should be valid");
        }
    }

    #[test]
    fn test_invalid_field_names() {
        let too_long = "a".repeat(MAX_FIELD_NAME_LEN + 1);
        for name in ["", "Name", "1st", "has space", "semi;colon", "drop--", too_long.as_str()] {
            assert!(!is_valid_field_name(name), "{name:?} should be invalid");
        }
    }

    #[test]
    fn test_validate_field_names() {
        let mut snapshot = Snapshot::new();
        snapshot.set("name", json!("x"));
        assert!(snapshot.validate_field_names().is_ok());

        snapshot.set("bad name", json!("y"));
        assert!(matches!(
            snapshot.validate_field_names(),
            Err(CommonError::InvalidFieldName(_))
        ));
    }
}
