//! Raw and normalized API records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat JSON object as returned by the upstream API.
pub type Record = Map<String, Value>;

/// Heterogeneous objects returned by one fetch: tweets, users and
/// expansion containers side-loading further tweets/users/places.
pub type RawBatch = Vec<Value>;

/// Aggregate counts produced by normalization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counts {
    /// Sum of the `result_count` reported by expansion containers
    pub total: u64,
    /// Tweets left after deduplication (0 when dedupe is off)
    pub deduped: u64,
}

/// Flattened output of the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NormalizedBatch {
    pub tweets: Vec<Record>,
    pub users: Vec<Record>,
    pub counts: Counts,
}

impl NormalizedBatch {
    pub fn is_empty(&self) -> bool {
        self.tweets.is_empty() && self.users.is_empty()
    }
}

/// Render a record's `id` as a string key, accepting string or numeric ids.
pub fn record_id(record: &Record) -> Option<String> {
    field_as_key(record, "id")
}

/// Render any scalar field as a string key.
pub fn field_as_key(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn record_id_accepts_strings_and_numbers() {
        assert_eq!(record_id(&record(json!({"id": "17"}))), Some("17".into()));
        assert_eq!(record_id(&record(json!({"id": 17}))), Some("17".into()));
        assert_eq!(record_id(&record(json!({"id": ""}))), None);
        assert_eq!(record_id(&record(json!({"id": null}))), None);
        assert_eq!(record_id(&record(json!({"text": "no id"}))), None);
    }
}
