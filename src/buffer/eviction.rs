use super::cost::CostAssigner;
use super::error::BufferError;
use super::metrics::{BufferMetrics, BufferMetricsSnapshot};
use super::queue::CostBoundedQueue;
use crate::record::LogRecord;
use std::sync::Arc;
use tracing::{debug, trace};

/// Cost-bounded buffer that evicts oldest records to admit new ones.
///
/// The sole eviction policy is unconditional oldest-first sacrifice: under
/// sustained overload the buffer keeps the newest records and silently drops
/// the oldest. Every eviction and admission drop is counted in
/// [`BufferMetrics`]; none of them ever surface as an error to the producer.
pub struct EvictingBuffer {
    queue: CostBoundedQueue,
    metrics: BufferMetrics,
}

impl EvictingBuffer {
    pub fn new(capacity: u64, assigner: Arc<dyn CostAssigner>) -> Result<Self, BufferError> {
        Ok(Self {
            queue: CostBoundedQueue::new(capacity, assigner)?,
            metrics: BufferMetrics::new(),
        })
    }

    /// Adds a record, evicting oldest entries if it does not fit.
    ///
    /// Returns `false` only when the record could not be admitted at all:
    /// either its own cost exceeds the buffer capacity, or a concurrent
    /// producer claimed the freed space before the single retry.
    pub fn add(&self, record: LogRecord) -> bool {
        let record = match self.queue.offer(record) {
            Ok(()) => return true,
            Err(record) => record,
        };

        let record_cost = self.queue.record_cost(&record);
        if record_cost > self.queue.capacity() {
            trace!(
                cost = record_cost,
                capacity = self.queue.capacity(),
                "record exceeds buffer capacity, dropping"
            );
            self.metrics.record_drop();
            return false;
        }

        let target_cost = self.queue.capacity() - record_cost;
        while self.queue.cost() > target_cost {
            if self.queue.poll().is_none() {
                break;
            }
            self.metrics.record_eviction();
        }
        debug!(cost = record_cost, "evicted oldest records to admit new record");

        // Single retry: a concurrent add may have claimed the freed space.
        match self.queue.offer(record) {
            Ok(()) => true,
            Err(_) => {
                self.metrics.record_drop();
                false
            }
        }
    }

    /// Drains up to `limit` oldest records in FIFO order.
    pub fn drain_to(&self, limit: usize) -> Vec<LogRecord> {
        self.queue.drain_to(limit)
    }

    /// Discards every buffered record, recording the loss. Used by the
    /// cross-cycle circuit breaker and the shutdown path.
    pub fn discard_all(&self) -> usize {
        let discarded = self.queue.clear();
        self.metrics.record_discard(discarded as u64);
        discarded
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn cost(&self) -> u64 {
        self.queue.cost()
    }

    pub fn capacity(&self) -> u64 {
        self.queue.capacity()
    }

    pub fn metrics(&self) -> BufferMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl std::fmt::Debug for EvictingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictingBuffer")
            .field("capacity", &self.queue.capacity())
            .field("cost", &self.queue.cost())
            .field("len", &self.queue.len())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::cost::RecordCostAssigner;
    use crate::record::LogRecord;

    /// Assigner with a fixed per-record cost, for predictable scenarios.
    struct FixedCost(u64);

    impl CostAssigner for FixedCost {
        fn cost(&self, _record: &LogRecord) -> u64 {
            self.0
        }
    }

    fn record(message: &str) -> LogRecord {
        LogRecord::new(message, "app", "stream", "log")
    }

    #[test]
    fn add_within_capacity_succeeds_without_eviction() {
        let buffer = EvictingBuffer::new(1000, Arc::new(FixedCost(100))).unwrap();
        assert!(buffer.add(record("a")));
        assert!(buffer.add(record("b")));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.metrics().evicted, 0);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let buffer = EvictingBuffer::new(1000, Arc::new(FixedCost(300))).unwrap();
        for m in ["r1", "r2", "r3", "r4", "r5"] {
            assert!(buffer.add(record(m)));
        }
        // r1 and r2 evicted; r3..r5 remain at cost 900.
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.cost(), 900);
        assert_eq!(buffer.metrics().evicted, 2);

        let drained = buffer.drain_to(2);
        let messages: Vec<_> = drained.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["r3", "r4"]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.cost(), 300);
        assert_eq!(buffer.drain_to(1)[0].message, "r5");
    }

    #[test]
    fn oversized_record_is_dropped_and_buffer_unchanged() {
        let buffer = EvictingBuffer::new(64, Arc::new(RecordCostAssigner)).unwrap();
        assert!(buffer.add(record("small")));
        let len_before = buffer.len();
        let cost_before = buffer.cost();

        let huge = record(&"x".repeat(200));
        assert!(!buffer.add(huge));
        assert_eq!(buffer.len(), len_before);
        assert_eq!(buffer.cost(), cost_before);
        assert_eq!(buffer.metrics().dropped, 1);
        assert_eq!(buffer.metrics().evicted, 0);
    }

    #[test]
    fn repeated_overflow_always_evicts_from_front() {
        let buffer = EvictingBuffer::new(300, Arc::new(FixedCost(100))).unwrap();
        for i in 0..10 {
            assert!(buffer.add(record(&format!("m{i}"))));
        }
        let remaining: Vec<_> = buffer
            .drain_to(10)
            .iter()
            .map(|r| r.message.clone())
            .collect();
        assert_eq!(remaining, ["m7", "m8", "m9"]);
        assert_eq!(buffer.metrics().evicted, 7);
    }

    #[test]
    fn discard_all_counts_loss() {
        let buffer = EvictingBuffer::new(1000, Arc::new(FixedCost(100))).unwrap();
        for i in 0..5 {
            buffer.add(record(&format!("m{i}")));
        }
        assert_eq!(buffer.discard_all(), 5);
        assert!(buffer.is_empty());
        assert_eq!(buffer.cost(), 0);
        assert_eq!(buffer.metrics().discarded, 5);
    }
}
