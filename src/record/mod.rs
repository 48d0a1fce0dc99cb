//! Event records returned by the search results endpoint
//!
//! Field sets are dynamic and vary from one record to the next, so a record
//! is an ordered mapping rather than a fixed struct:
//! - Keys compare case-insensitively but keep their original spelling
//! - Insertion order is preserved for output
//! - `None` (JSON null) is kept distinct from an empty string

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

/// Separator used when flattening multi-valued fields.
pub const MULTI_VALUE_SEPARATOR: &str = ", ";

/// One indexed event as an ordered, case-insensitive field map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecord {
    fields: Vec<(String, Option<String>)>,
}

impl EventRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field.
    ///
    /// A key matching an existing field case-insensitively replaces its value
    /// in place; the original position and spelling are kept.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => self.fields[idx].1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Look up a field value by case-insensitive name.
    ///
    /// Returns `None` when the field is absent, `Some(None)` when it is null.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.position(key)
            .map(|idx| self.fields[idx].1.as_deref())
    }

    /// Look up a field and collapse absent and null into `None`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).flatten()
    }

    /// Whether the record has a field with this name (case-insensitive).
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a record from one element of the `results` array.
    ///
    /// Non-object values produce an empty record.
    pub fn from_json(value: &JsonValue) -> Self {
        let mut record = Self::new();
        if let JsonValue::Object(map) = value {
            for (key, value) in map {
                record.insert(key.clone(), flatten_value(value));
            }
        }
        record
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|(k, _)| keys_equal(k, key))
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for EventRecord {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl Serialize for EventRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Case-insensitive field name comparison.
pub fn keys_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || (!a.is_ascii() && a.to_lowercase() == b.to_lowercase())
}

/// Convert a JSON field value to its text form.
///
/// # Arguments
/// * `value` - Raw value from the results payload
///
/// # Returns
/// * `Option<String>` - `None` for null, the literal text otherwise
pub fn flatten_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::Array(items) => Some(
            items
                .iter()
                .map(|item| flatten_value(item).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(MULTI_VALUE_SEPARATOR),
        ),
        other => Some(scalar_text(other)),
    }
}

fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        // Nested objects are rare in results; keep them readable as JSON text
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut record = EventRecord::new();
        record.insert("Host", Some("web-01".into()));

        assert_eq!(record.value("host"), Some("web-01"));
        assert_eq!(record.value("HOST"), Some("web-01"));
        assert!(record.contains_key("hOsT"));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut record = EventRecord::new();
        record.insert("a", Some("1".into()));
        record.insert("B", Some("2".into()));
        record.insert("A", Some("3".into()));

        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["a", "B"]);
        assert_eq!(record.value("a"), Some("3"));
    }

    #[test]
    fn test_null_distinct_from_empty() {
        let record = EventRecord::from_json(&json!({ "empty": "", "null": null }));
        assert_eq!(record.get("empty"), Some(Some("")));
        assert_eq!(record.get("null"), Some(None));
        assert_eq!(record.value("null"), None);
    }

    #[test]
    fn test_from_json_flattens_values() {
        let record = EventRecord::from_json(&json!({
            "tags": ["a", "b", "c"],
            "count": 42,
            "ratio": 0.5,
            "ok": true,
        }));

        assert_eq!(record.value("tags"), Some("a, b, c"));
        assert_eq!(record.value("count"), Some("42"));
        assert_eq!(record.value("ratio"), Some("0.5"));
        assert_eq!(record.value("ok"), Some("true"));
    }

    #[test]
    fn test_from_json_keeps_source_field_order() {
        let value: JsonValue =
            serde_json::from_str(r#"{"_time":"t","_raw":"r","host":"h","count":1}"#).unwrap();
        let record = EventRecord::from_json(&value);

        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["_time", "_raw", "host", "count"]);
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"_time":"t","_raw":"r","host":"h","count":"1"}"#
        );
    }

    #[test]
    fn test_from_json_non_object_is_empty() {
        assert!(EventRecord::from_json(&json!("text")).is_empty());
    }

    #[test]
    fn test_serialize_preserves_order_and_nulls() {
        let record: EventRecord = vec![
            ("z", Some("1".to_string())),
            ("a", None),
            ("m", Some(String::new())),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"z":"1","a":null,"m":""}"#);
    }
}
