//! Record Shape
//!
//! Every table row crosses the store boundary as a JSON object (`Record`).
//! Typed models convert through `to_record` / `from_record`; nothing above
//! the store layer builds rows by hand.
//!
//! Timestamps are written as RFC 3339 with fixed microsecond precision so
//! that lexicographic order on the stored string matches chronological
//! order. Store-side ordering relies on this.

use crate::db::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A single table row
pub type Record = Map<String, Value>;

/// Format a timestamp in the canonical stored form
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in the canonical stored form
pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

/// Serialize a typed value into a row
///
/// Fails with `InvalidRequest` if the value does not serialize to a JSON
/// object (rows are always objects).
pub fn to_record<T: Serialize>(value: &T) -> Result<Record, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::invalid_request(format!(
            "expected a JSON object for a record, got {}",
            other
        ))),
    }
}

/// Deserialize a row into a typed value
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Fill store-generated columns on a record about to be inserted
///
/// `id` gets a v4 UUID and `created_at` the current time, but only when
/// the caller left them out (or null). Client-chosen ids are kept so a
/// node's materialized path can embed its own id.
pub fn prepare_insert(mut record: Record) -> Record {
    if !has_value(&record, "id") {
        record.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    }
    if !has_value(&record, "created_at") {
        record.insert("created_at".to_string(), Value::String(now_timestamp()));
    }
    record
}

/// Merge a sparse patch into a record (top-level keys replace)
///
/// The `id` column is immutable; a patch carrying one is ignored for that key.
pub fn apply_patch(record: &mut Record, patch: &Record) {
    for (key, value) in patch {
        if key == "id" {
            continue;
        }
        record.insert(key.clone(), value.clone());
    }
}

/// The record's `id` column as a string, if present
pub fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn has_value(record: &Record, key: &str) -> bool {
    matches!(record.get(key), Some(v) if !v.is_null())
}

/// Serde adapter writing `DateTime<Utc>` in the canonical stored form
pub mod timestamp {
    use super::format_timestamp;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    /// Same as the parent module, for optional columns
    pub mod option {
        use super::super::format_timestamp;
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match at {
                Some(at) => serializer.serialize_str(&format_timestamp(at)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}
