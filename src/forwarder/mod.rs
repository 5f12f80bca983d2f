pub mod scheduler;

pub use scheduler::{FlushScheduler, FlushSignal, SchedulerConfig};

use crate::app::Config;
use crate::buffer::{BufferError, BufferMetricsSnapshot, EvictingBuffer, RecordCostAssigner};
use crate::dispatch::{DispatchError, Dispatcher, IngestClient, IngestConfig};
use crate::encoder::BatchEncoder;
use crate::record::LogRecord;
use crate::scrub::MessageScrubber;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Threshold signals the append path can leave pending before new ones are
/// shed; one pending signal is enough to wake the scheduler.
const TRIGGER_CHANNEL_CAPACITY: usize = 16;

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Shutdown timeout exceeded")]
    ShutdownTimeout,
}

/// The appender surface: non-blocking `append` for any number of producers,
/// `start`/`stop` lifecycle around the background flush scheduler.
///
/// Any host integration can drive this: a logging-framework shim, a direct
/// library call, or a sidecar feeding lines from a file.
pub struct Forwarder {
    buffer: Arc<EvictingBuffer>,
    scrubber: Option<MessageScrubber>,
    trigger: mpsc::Sender<FlushSignal>,
    healthy: Arc<AtomicBool>,
    batch_size: usize,
    cancel: CancellationToken,
    // Consumed by start(); present only between new() and start().
    pending: Mutex<Option<(FlushScheduler, mpsc::Receiver<FlushSignal>)>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Forwarder {
    pub fn new(config: &Config) -> Result<Self, ForwarderError> {
        let buffer = Arc::new(EvictingBuffer::new(
            config.queue_capacity,
            Arc::new(RecordCostAssigner),
        )?);

        let client = IngestClient::new(&IngestConfig {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            connect_timeout: config.connect_timeout,
            // The endpoint gets the same budget for the whole request as for
            // establishing the connection.
            request_timeout: config.connect_timeout,
            pool_size: config.conn_pool_size,
        })?;
        info!(
            endpoint = client.endpoint(),
            pool_size = config.conn_pool_size,
            "ingest client ready"
        );

        let dispatcher = Arc::new(Dispatcher::new(
            client,
            BatchEncoder::new(),
            buffer.clone(),
            config.custom_field_map(),
            config.merge_custom_fields,
            config.max_message_size,
        ));

        let healthy = Arc::new(AtomicBool::new(true));
        let scheduler = FlushScheduler::new(
            buffer.clone(),
            dispatcher,
            SchedulerConfig {
                batch_size: config.batch_size,
                flush_interval: config.flush_interval,
                max_retries: config.max_retries,
            },
            healthy.clone(),
        );

        let (trigger, trigger_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);

        let scrubber = config
            .scrub_patterns
            .as_deref()
            .map(MessageScrubber::new)
            .filter(|s| !s.is_empty());

        Ok(Self {
            buffer,
            scrubber,
            trigger,
            healthy,
            batch_size: config.batch_size,
            cancel: CancellationToken::new(),
            pending: Mutex::new(Some((scheduler, trigger_rx))),
            task: Mutex::new(None),
        })
    }

    /// Spawns the flush scheduler. Idempotent; later calls are no-ops.
    pub fn start(&self) {
        let Some((scheduler, trigger_rx)) = self.pending.lock().take() else {
            warn!("forwarder already started");
            return;
        };
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(scheduler.run(trigger_rx, cancel));
        *self.task.lock() = Some(handle);
        info!("forwarder started");
    }

    /// Queues one record. Never blocks on I/O and never surfaces a failure
    /// to the caller: on buffer exhaustion the record is silently dropped
    /// (and counted in the buffer metrics).
    pub fn append(&self, mut record: LogRecord) {
        if let Some(scrubber) = &self.scrubber {
            record.message = scrubber.scrub(&record.message);
        }

        if !self.buffer.add(record) {
            trace!("record dropped at admission");
        }

        // Threshold flushes are suppressed while the connection is degraded;
        // only the scheduled timer retries then.
        if self.buffer.len() >= self.batch_size && self.healthy.load(Ordering::Relaxed) {
            // A full channel already holds a wake-up; dropping this signal
            // loses nothing.
            let _ = self.trigger.try_send(FlushSignal::Threshold);
        }
    }

    /// Stops the scheduler: cancels the timer, lets the final drain-and-flush
    /// run, and waits up to `timeout` for it to finish. Records still in
    /// flight past the deadline are lost.
    pub async fn stop(&self, timeout: Duration) -> Result<(), ForwarderError> {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(timeout, handle).await {
                Ok(_) => info!("forwarder stopped"),
                Err(_) => {
                    warn!("shutdown timeout exceeded, abandoning in-flight records");
                    return Err(ForwarderError::ShutdownTimeout);
                }
            }
        }
        Ok(())
    }

    /// Stop with the default grace period.
    pub async fn shutdown(&self) -> Result<(), ForwarderError> {
        self.stop(DEFAULT_STOP_TIMEOUT).await
    }

    /// Point-in-time buffered record count.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn metrics(&self) -> BufferMetricsSnapshot {
        self.buffer.metrics()
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("buffered", &self.buffer.len())
            .field("batch_size", &self.batch_size)
            .field("healthy", &self.healthy.load(Ordering::Relaxed))
            .finish()
    }
}
