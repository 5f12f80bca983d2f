pub mod cost;
pub mod error;
pub mod eviction;
pub mod metrics;
pub mod queue;

pub use cost::{CostAssigner, RecordCostAssigner};
pub use error::BufferError;
pub use eviction::EvictingBuffer;
pub use metrics::{BufferMetrics, BufferMetricsSnapshot};
pub use queue::CostBoundedQueue;
