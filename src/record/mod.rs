use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scalar value carried in a record's property map.
///
/// The ingestion schema only accepts flat scalar attributes, so the variant
/// set is deliberately closed: serialization over it is exhaustive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Byte length of the value as it would render in a payload.
    /// Used for cost accounting, not for exact wire sizing.
    pub fn rendered_len(&self) -> usize {
        match self {
            FieldValue::String(s) => s.len(),
            FieldValue::Number(n) => format!("{n}").len(),
            FieldValue::Bool(true) => 4,
            FieldValue::Bool(false) => 5,
            FieldValue::Null => 4,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// One buffered log record. Immutable once constructed; ownership moves from
/// the producer into the buffer, then into the batch drained for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub message: String,
    pub application_name: String,
    /// Logical stream/component the record originated from.
    pub name: String,
    pub log_type: String,
    /// Milliseconds since the epoch, captured at record creation, not send time.
    pub timestamp: i64,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldValue>,
}

impl LogRecord {
    pub fn new(
        message: impl Into<String>,
        application_name: impl Into<String>,
        name: impl Into<String>,
        log_type: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            application_name: application_name.into(),
            name: name.into(),
            log_type: log_type.into(),
            timestamp: Utc::now().timestamp_millis(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = timestamp_ms;
        self
    }

    pub fn with_properties(mut self, properties: BTreeMap<String, FieldValue>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Parses the `customFields` configuration attribute: comma-separated
/// `key=value` pairs. Malformed pairs are skipped, matching the lenient
/// behavior hosts expect from appender configuration.
pub fn parse_custom_fields(spec: &str) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    for pair in spec.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                fields.insert(key.to_string(), FieldValue::String(value.trim().to_string()));
            }
        }
    }
    fields
}
