use super::cost::CostAssigner;
use super::error::BufferError;
use crate::record::LogRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe FIFO queue bounded by cumulative record cost rather than
/// record count.
///
/// Invariant: after any completed operation the cost counter equals the sum
/// of the assigned costs of all contained records and never exceeds the
/// capacity. The check-and-reserve in [`offer`](Self::offer) is a single
/// critical section, so two concurrent admits cannot jointly overshoot.
///
/// The cost counter is mirrored in an atomic so `cost()` stays lock-free;
/// its value may be stale the instant it is read and is only used for
/// telemetry and eviction targets, never for the admission check itself.
pub struct CostBoundedQueue {
    inner: Mutex<VecDeque<LogRecord>>,
    cost: AtomicU64,
    capacity: u64,
    assigner: Arc<dyn CostAssigner>,
}

impl CostBoundedQueue {
    pub fn new(capacity: u64, assigner: Arc<dyn CostAssigner>) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity);
        }
        Ok(Self {
            inner: Mutex::new(VecDeque::new()),
            cost: AtomicU64::new(0),
            capacity,
            assigner,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Cost of one record under this queue's assigner.
    pub fn record_cost(&self, record: &LogRecord) -> u64 {
        self.assigner.cost(record)
    }

    /// Attempts to append a record. Returns the record unchanged if admitting
    /// it would push the cumulative cost past capacity; no existing entries
    /// are scanned or modified on rejection.
    pub fn offer(&self, record: LogRecord) -> Result<(), LogRecord> {
        let record_cost = self.assigner.cost(&record);
        let mut queue = self.inner.lock();
        if self.cost.load(Ordering::Relaxed) + record_cost > self.capacity {
            return Err(record);
        }
        queue.push_back(record);
        self.cost.fetch_add(record_cost, Ordering::Relaxed);
        Ok(())
    }

    /// Removes and returns the oldest record, decrementing the cost counter.
    pub fn poll(&self) -> Option<LogRecord> {
        let mut queue = self.inner.lock();
        let record = queue.pop_front()?;
        self.cost
            .fetch_sub(self.assigner.cost(&record), Ordering::Relaxed);
        Some(record)
    }

    /// Atomically removes up to `limit` oldest records in FIFO order.
    /// Records offered after the drain snapshot is taken are not included.
    pub fn drain_to(&self, limit: usize) -> Vec<LogRecord> {
        let mut queue = self.inner.lock();
        let count = limit.min(queue.len());
        let drained: Vec<LogRecord> = queue.drain(..count).collect();
        let drained_cost: u64 = drained.iter().map(|r| self.assigner.cost(r)).sum();
        self.cost.fetch_sub(drained_cost, Ordering::Relaxed);
        drained
    }

    /// Empties the queue and resets the cost counter. Returns the number of
    /// records discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.inner.lock();
        let count = queue.len();
        queue.clear();
        self.cost.store(0, Ordering::Relaxed);
        count
    }

    /// Point-in-time cumulative cost; may be stale under concurrent mutation.
    pub fn cost(&self) -> u64 {
        self.cost.load(Ordering::Relaxed)
    }

    /// Point-in-time record count; may be stale under concurrent mutation.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CostBoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostBoundedQueue")
            .field("capacity", &self.capacity)
            .field("cost", &self.cost())
            .field("len", &self.len())
            .finish()
    }
}
