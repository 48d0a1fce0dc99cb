//! Field selection shared by the output encoders
//!
//! With an explicit field list only those fields are emitted, in list order,
//! and missing fields render as absent. Without one, every field in the data
//! is emitted.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::record::{EventRecord, keys_equal};

/// Fields placed first in auto-derived CSV headers, in this order.
pub const COMMON_FIELDS: [&str; 6] = ["_time", "_raw", "host", "source", "sourcetype", "index"];

/// Optional ordered allow-list of field names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    fields: Option<Vec<String>>,
}

impl FieldSelection {
    pub fn new(fields: Option<Vec<String>>) -> Self {
        Self { fields }
    }

    /// Select every field
    pub fn all() -> Self {
        Self::default()
    }

    /// Explicit field list, if any
    pub fn explicit(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// View a record through this selection for structured output.
    pub fn project<'a>(&'a self, record: &'a EventRecord) -> SelectedRecord<'a> {
        SelectedRecord {
            record,
            fields: self.explicit(),
        }
    }
}

/// A record restricted to a selection, serialized as a JSON object.
pub struct SelectedRecord<'a> {
    record: &'a EventRecord,
    fields: Option<&'a [String]>,
}

impl Serialize for SelectedRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.fields {
            None => self.record.serialize(serializer),
            Some(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for field in fields {
                    map.serialize_entry(field, &self.record.value(field))?;
                }
                map.end()
            }
        }
    }
}

/// Derive a header from the keys of a batch.
///
/// Keys are deduplicated case-insensitively, keeping the first spelling seen.
/// Common fields come first in their fixed order (each only when present),
/// followed by all other fields sorted case-insensitively.
pub fn derive_header(records: &[EventRecord]) -> Vec<String> {
    let mut observed: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !observed.iter().any(|k| keys_equal(k, key)) {
                observed.push(key);
            }
        }
    }

    let mut header: Vec<String> = Vec::with_capacity(observed.len());
    for common in COMMON_FIELDS {
        if let Some(idx) = observed.iter().position(|k| keys_equal(k, common)) {
            header.push(observed.remove(idx).to_string());
        }
    }

    observed.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    header.extend(observed.into_iter().map(String::from));
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(keys: &[&str]) -> EventRecord {
        keys.iter()
            .map(|k| (k.to_string(), Some(format!("v_{k}"))))
            .collect()
    }

    #[test]
    fn test_derive_header_common_fields_first() {
        let records = vec![record(&["zeta", "index", "Alpha", "_raw", "host", "_time", "beta"])];
        assert_eq!(
            derive_header(&records),
            vec!["_time", "_raw", "host", "index", "Alpha", "beta", "zeta"]
        );
    }

    #[test]
    fn test_derive_header_skips_absent_common_fields() {
        let records = vec![record(&["b", "sourcetype", "a"])];
        assert_eq!(derive_header(&records), vec!["sourcetype", "a", "b"]);
    }

    #[test]
    fn test_derive_header_merges_batch_keys_case_insensitively() {
        let records = vec![record(&["Host", "x"]), record(&["host", "y", "X"])];
        assert_eq!(derive_header(&records), vec!["Host", "x", "y"]);
    }

    #[test]
    fn test_derive_header_empty() {
        assert!(derive_header(&[]).is_empty());
    }

    #[test]
    fn test_project_all_fields() {
        let selection = FieldSelection::all();
        let rec = record(&["b", "a"]);
        let json = serde_json::to_string(&selection.project(&rec)).unwrap();
        assert_eq!(json, r#"{"b":"v_b","a":"v_a"}"#);
    }

    #[test]
    fn test_project_explicit_fields_in_order_with_missing() {
        let selection = FieldSelection::new(Some(vec!["A".into(), "missing".into(), "b".into()]));
        let rec = record(&["b", "a", "c"]);
        let json = serde_json::to_string(&selection.project(&rec)).unwrap();
        assert_eq!(json, r#"{"A":"v_a","missing":null,"b":"v_b"}"#);
    }
}
