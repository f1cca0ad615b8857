// sanitize.rs

use serde::ser::{Error as SerError, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::seeq::error::{Result, SeeqError};
use crate::seeq::types::Value;

/// Deep-cleans a value tree so every leaf is a JSON primitive.
///
/// NaN becomes `Null` and timestamps become `YYYY-MM-DD HH:MM:SS` strings (UTC when a
/// zone is attached). Mappings keep their key order. Applying it twice changes nothing.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Float(f) if f.is_nan() => Value::Null,
        Value::Timestamp(ts) => Value::String(ts.to_output_string()),
        Value::Mapping(entries) => Value::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (key, sanitize(value)))
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(sanitize).collect()),
        other => other,
    }
}

/// Emits compact JSON text. Infinite floats have no JSON form and fail.
pub fn to_json_string(value: &Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SeeqError::Serialization(e.to_string()))
}

/// Like [`to_json_string`], but unrepresentable leaves are written as strings.
pub fn to_json_string_lossy(value: &Value) -> Result<String> {
    to_json_string(&stringify_non_finite(value.clone()))
}

fn stringify_non_finite(value: Value) -> Value {
    match value {
        Value::Float(f) if !f.is_finite() => Value::String(f.to_string()),
        Value::Timestamp(ts) => Value::String(ts.to_string()),
        Value::Mapping(entries) => Value::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (key, stringify_non_finite(value)))
                .collect(),
        ),
        Value::Sequence(items) => {
            Value::Sequence(items.into_iter().map(stringify_non_finite).collect())
        }
        other => other,
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(f) => Err(S::Error::custom(format!(
                "float value {} is not JSON compliant",
                f
            ))),
            Value::String(s) => serializer.serialize_str(s),
            Value::Timestamp(ts) => serializer.serialize_str(&ts.to_output_string()),
            Value::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Sequence(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Value::Mapping(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
