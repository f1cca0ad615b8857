// envelope.rs

use serde::{Serialize, Serializer};
use serde_json::json;
use tracing::warn;

use crate::constants::SUPPORTED_DATETIME_FORMATS;
use crate::seeq::error::SeeqError;
use crate::seeq::sanitize::{sanitize, to_json_string, to_json_string_lossy};
use crate::seeq::types::{SensorRecord, Value};

/// Uniform response wrapper returned by every operation.
///
/// `error` and `traceback` are only ever set on failures.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub traceback: Option<String>,
    fields: Vec<(String, Value)>,
}

impl Envelope {
    pub fn ok<T: Into<String>>(message: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            traceback: None,
            fields: Vec::new(),
        }
    }

    pub fn fail<M: Into<String>, E: Into<String>>(message: M, error: E) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
            traceback: None,
            fields: Vec::new(),
        }
    }

    /// Failure envelope for `err`, with the context fields that error kind carries.
    pub fn from_error(err: &SeeqError) -> Self {
        let mut envelope = Self::fail(err.to_string(), err.code());
        match err {
            SeeqError::AuthenticationRequired { message }
            | SeeqError::AuthenticationFailed { message, .. } => {
                envelope = envelope.with(
                    "auth_details",
                    Value::mapping(vec![
                        ("success", Value::Bool(false)),
                        ("message", Value::from(message.as_str())),
                    ]),
                );
            }
            SeeqError::DateParse { .. } | SeeqError::InvalidTimezone { .. } => {
                envelope = envelope.with("supported_formats", SUPPORTED_DATETIME_FORMATS.to_vec());
            }
            _ => {}
        }
        if let Some(records) = err.records() {
            envelope = envelope.with("search_results", records_to_value(records));
        }
        if err.is_unexpected() {
            envelope.traceback = Some(err.traceback());
        }
        envelope
    }

    pub fn usage() -> Self {
        Self::fail(
            "Usage: tsflow-runner <function_name> <json_args>",
            "Invalid arguments",
        )
    }

    /// Sets an operation-specific field, replacing any earlier value for `key`.
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            ("success".to_string(), Value::Bool(self.success)),
            ("message".to_string(), Value::from(self.message.as_str())),
        ];
        if let Some(error) = &self.error {
            entries.push(("error".to_string(), Value::from(error.as_str())));
        }
        if let Some(traceback) = &self.traceback {
            entries.push(("traceback".to_string(), Value::from(traceback.as_str())));
        }
        entries.extend(self.fields.iter().cloned());
        Value::Mapping(entries)
    }

    /// The single stdout line for this envelope.
    ///
    /// Falls back to a lossy rendering, then to a minimal error object; never fails.
    pub fn to_json_line(&self) -> String {
        let value = sanitize(self.to_value());
        let primary = match to_json_string(&value) {
            Ok(line) => return line,
            Err(e) => e,
        };
        warn!(error = %primary, "serialization failed, retrying with lossy rendering");
        match to_json_string_lossy(&value) {
            Ok(line) => line,
            Err(fallback) => json!({
                "success": false,
                "error": primary.to_string(),
                "fallback_error": fallback.to_string(),
            })
            .to_string(),
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

pub fn records_to_value(records: &[SensorRecord]) -> Value {
    Value::Sequence(records.iter().map(SensorRecord::to_value).collect())
}
