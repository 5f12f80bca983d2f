use crate::record::{FieldValue, LogRecord};
use flate2::{Compression, write::GzEncoder};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

/// Marker attached to every event so the ingestion side can tell which
/// forwarder produced it.
const SOURCE_FIELD: &str = "relay-log-forwarder";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Compression failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializes record batches into compressed wire payloads.
///
/// Field names are lower-cased to normalize against a case-insensitive
/// ingestion schema; the record's stream, type, application and timestamp are
/// promoted to top-level event fields.
#[derive(Debug, Clone)]
pub struct BatchEncoder {
    hostname: String,
}

impl BatchEncoder {
    pub fn new() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self { hostname }
    }

    #[cfg(test)]
    pub fn with_hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    /// Encodes a record set into one compressed payload.
    ///
    /// The caller is responsible for checking the result against the
    /// configured maximum message size and falling back to
    /// [`split_into_sub_batches`](Self::split_into_sub_batches).
    pub fn encode(
        &self,
        records: &[LogRecord],
        custom_fields: &BTreeMap<String, FieldValue>,
        merge_custom_fields: bool,
    ) -> Result<Vec<u8>, EncodeError> {
        let events: Vec<Value> = records
            .iter()
            .map(|record| self.build_event(record, custom_fields, merge_custom_fields))
            .collect();
        let json = serde_json::to_vec(&events)?;
        Ok(gzip_compress(&json)?)
    }

    /// Compressed size of a single record's encoding. Used by the splitter.
    fn encoded_record_size(
        &self,
        record: &LogRecord,
        custom_fields: &BTreeMap<String, FieldValue>,
        merge_custom_fields: bool,
    ) -> Result<usize, EncodeError> {
        let event = self.build_event(record, custom_fields, merge_custom_fields);
        let json = serde_json::to_vec(&event)?;
        Ok(gzip_compress(&json)?.len())
    }

    /// Greedy single-pass split of a record set into sub-batches whose summed
    /// per-record compressed sizes stay within `max_message_size`.
    ///
    /// The per-record sum is an approximation of the true size of the
    /// compressed group; it is accepted in exchange for O(N) splitting
    /// instead of iterative compress-and-check over the whole batch.
    pub fn split_into_sub_batches(
        &self,
        records: Vec<LogRecord>,
        custom_fields: &BTreeMap<String, FieldValue>,
        merge_custom_fields: bool,
        max_message_size: usize,
    ) -> Result<Vec<Vec<LogRecord>>, EncodeError> {
        let mut batches = Vec::new();
        let mut current: Vec<LogRecord> = Vec::new();
        let mut current_size = 0usize;

        for record in records {
            let size = self.encoded_record_size(&record, custom_fields, merge_custom_fields)?;
            if !current.is_empty() && current_size + size > max_message_size {
                batches.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current.push(record);
            current_size += size;
        }
        if !current.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }

    /// Builds one structured event for a record. All keys are lower-cased;
    /// record properties win over static custom fields on collision.
    fn build_event(
        &self,
        record: &LogRecord,
        custom_fields: &BTreeMap<String, FieldValue>,
        merge_custom_fields: bool,
    ) -> Value {
        let mut event = Map::new();

        let mut custom = Map::new();
        for (key, value) in custom_fields {
            custom.insert(key.to_lowercase(), to_json(value));
        }
        for (key, value) in &record.properties {
            custom.insert(key.to_lowercase(), to_json(value));
        }

        if merge_custom_fields {
            event.append(&mut custom);
        } else if !custom.is_empty() {
            event.insert("custom".to_string(), Value::Object(custom));
        }

        // Promoted fields are inserted last so a colliding custom key can
        // never clobber them.
        event.insert("message".to_string(), Value::String(record.message.clone()));
        event.insert(
            "applicationname".to_string(),
            Value::String(record.application_name.clone()),
        );
        event.insert("name".to_string(), Value::String(record.name.clone()));
        event.insert("logtype".to_string(), Value::String(record.log_type.clone()));
        event.insert("timestamp".to_string(), Value::Number(record.timestamp.into()));
        event.insert("hostname".to_string(), Value::String(self.hostname.clone()));
        event.insert("source".to_string(), Value::String(SOURCE_FIELD.to_string()));

        Value::Object(event)
    }
}

impl Default for BatchEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::String(s) => Value::String(s.clone()),
        FieldValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Null => Value::Null,
    }
}

fn gzip_compress(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn decompress(payload: &[u8]) -> Vec<Value> {
        let mut decoder = GzDecoder::new(payload);
        let mut json = String::new();
        decoder.read_to_string(&mut json).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    fn record(message: &str) -> LogRecord {
        LogRecord::new(message, "MyApp", "orders", "muleLog").with_timestamp(1_700_000_000_000)
    }

    #[test]
    fn events_promote_fields_with_lowercase_keys() {
        let encoder = BatchEncoder::with_hostname("host-1");
        let payload = encoder
            .encode(&[record("hello")], &BTreeMap::new(), false)
            .unwrap();
        let events = decompress(&payload);
        assert_eq!(events.len(), 1);
        let event = events[0].as_object().unwrap();
        assert_eq!(event["message"], "hello");
        assert_eq!(event["applicationname"], "MyApp");
        assert_eq!(event["name"], "orders");
        assert_eq!(event["logtype"], "muleLog");
        assert_eq!(event["timestamp"], 1_700_000_000_000i64);
        assert_eq!(event["hostname"], "host-1");
        assert!(event.keys().all(|k| k.chars().all(|c| !c.is_uppercase())));
    }

    #[test]
    fn custom_fields_nest_under_custom_by_default() {
        let encoder = BatchEncoder::with_hostname("h");
        let custom = crate::record::parse_custom_fields("Env=prod");
        let payload = encoder.encode(&[record("m")], &custom, false).unwrap();
        let events = decompress(&payload);
        let event = events[0].as_object().unwrap();
        assert_eq!(event["custom"]["env"], "prod");
        assert!(!event.contains_key("env"));
    }

    #[test]
    fn custom_fields_merge_flat_when_enabled() {
        let encoder = BatchEncoder::with_hostname("h");
        let custom = crate::record::parse_custom_fields("env=prod");
        let payload = encoder.encode(&[record("m")], &custom, true).unwrap();
        let events = decompress(&payload);
        let event = events[0].as_object().unwrap();
        assert_eq!(event["env"], "prod");
        assert!(!event.contains_key("custom"));
    }

    #[test]
    fn record_properties_override_static_fields() {
        let encoder = BatchEncoder::with_hostname("h");
        let custom = crate::record::parse_custom_fields("env=prod");
        let rec = record("m").with_property("env", "staging");
        let payload = encoder.encode(&[rec], &custom, false).unwrap();
        let events = decompress(&payload);
        assert_eq!(events[0]["custom"]["env"], "staging");
    }

    #[test]
    fn merged_custom_field_cannot_clobber_promoted_fields() {
        let encoder = BatchEncoder::with_hostname("h");
        let custom = crate::record::parse_custom_fields("message=spoofed");
        let payload = encoder.encode(&[record("real")], &custom, true).unwrap();
        let events = decompress(&payload);
        assert_eq!(events[0]["message"], "real");
    }

    #[test]
    fn split_partitions_exactly_in_order() {
        let encoder = BatchEncoder::with_hostname("h");
        let records: Vec<_> = (0..20)
            .map(|i| record(&format!("message number {i} {}", "padding ".repeat(30))))
            .collect();
        let single = encoder
            .encoded_record_size(&records[0], &BTreeMap::new(), false)
            .unwrap();
        // Force roughly three records per sub-batch.
        let max = single * 3 + 1;
        let batches = encoder
            .split_into_sub_batches(records.clone(), &BTreeMap::new(), false, max)
            .unwrap();

        assert!(batches.len() > 1);
        let flattened: Vec<_> = batches.iter().flatten().cloned().collect();
        assert_eq!(flattened, records);
        for batch in &batches {
            let sum: usize = batch
                .iter()
                .map(|r| {
                    encoder
                        .encoded_record_size(r, &BTreeMap::new(), false)
                        .unwrap()
                })
                .sum();
            assert!(sum <= max);
        }
    }

    #[test]
    fn split_keeps_single_oversized_record_alone() {
        let encoder = BatchEncoder::with_hostname("h");
        let records = vec![record("small"), record(&"big ".repeat(500)), record("tail")];
        let batches = encoder
            .split_into_sub_batches(records, &BTreeMap::new(), false, 1)
            .unwrap();
        // Every record exceeds the bound on its own, so each goes alone.
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 1));
    }
}
