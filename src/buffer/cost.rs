use crate::record::LogRecord;

/// Fixed accounting overhead for the millisecond timestamp field.
const TIMESTAMP_OVERHEAD: u64 = 8;

/// Assigns a memory cost to a record for capacity accounting.
///
/// The cost is a heuristic, not the exact wire size: it only has to be
/// deterministic, cheap, and roughly proportional to the record's footprint.
pub trait CostAssigner: Send + Sync {
    fn cost(&self, record: &LogRecord) -> u64;
}

/// Default policy: sum of the UTF-8 lengths of every textual field plus a
/// small fixed overhead for the timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordCostAssigner;

impl CostAssigner for RecordCostAssigner {
    fn cost(&self, record: &LogRecord) -> u64 {
        let text = record.message.len()
            + record.application_name.len()
            + record.log_type.len()
            + record.name.len();

        let properties: usize = record
            .properties
            .iter()
            .map(|(key, value)| key.len() + value.rendered_len())
            .sum();

        text as u64 + properties as u64 + TIMESTAMP_OVERHEAD
    }
}
