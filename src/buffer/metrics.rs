use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for the silent data-loss events the buffer can produce.
/// Best-effort telemetry: readers must tolerate staleness under concurrency.
#[derive(Debug, Default)]
pub struct BufferMetrics {
    evicted: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMetricsSnapshot {
    /// Records sacrificed oldest-first to admit newer ones.
    pub evicted: u64,
    /// Records rejected at admission (too large even after full eviction,
    /// or lost the post-eviction retry).
    pub dropped: u64,
    /// Records deliberately cleared by the retry circuit breaker or shutdown.
    pub discarded: u64,
}

impl BufferMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_eviction(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BufferMetricsSnapshot {
        BufferMetricsSnapshot {
            evicted: self.evicted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
