use crate::buffer::EvictingBuffer;
use crate::dispatch::Dispatcher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Producer-side nudge telling the scheduler the batch-size threshold was
/// crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushSignal {
    Threshold,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
}

/// Consecutive failed flush cycles. Owned exclusively by the scheduler task;
/// all mutation happens on that one actor, so no synchronization is needed
/// beyond the task boundary itself.
#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
}

/// Drives periodic and threshold-triggered flush cycles and owns the
/// cross-cycle retry circuit breaker.
///
/// Timer ticks and threshold signals are handled by the same task, so a
/// threshold-triggered cycle can never race a scheduled one.
pub struct FlushScheduler {
    buffer: Arc<EvictingBuffer>,
    dispatcher: Arc<Dispatcher>,
    config: SchedulerConfig,
    healthy: Arc<AtomicBool>,
    retry_state: RetryState,
}

impl FlushScheduler {
    pub fn new(
        buffer: Arc<EvictingBuffer>,
        dispatcher: Arc<Dispatcher>,
        config: SchedulerConfig,
        healthy: Arc<AtomicBool>,
    ) -> Self {
        Self {
            buffer,
            dispatcher,
            config,
            healthy,
            retry_state: RetryState::default(),
        }
    }

    /// Runs until cancelled, then performs a final best-effort drain of
    /// everything left in the buffer.
    pub async fn run(
        mut self,
        mut trigger: mpsc::Receiver<FlushSignal>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; consume the first tick so the first
        // flush waits a full interval.
        ticker.tick().await;

        info!(
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "flush scheduler started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush_cycle().await;
                }
                signal = trigger.recv() => {
                    match signal {
                        Some(FlushSignal::Threshold) => {
                            // While degraded only the timer retries, so a hot
                            // producer cannot hammer a down endpoint.
                            if self.healthy.load(Ordering::Relaxed) {
                                self.flush_cycle().await;
                            } else {
                                debug!("skipping threshold flush while connection is degraded");
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.final_flush().await;
        info!("flush scheduler stopped");
    }

    /// One flush cycle: drain up to `batch_size`, dispatch, update the retry
    /// counter, and trip the circuit breaker when retries are exhausted.
    async fn flush_cycle(&mut self) {
        let batch = self.buffer.drain_to(self.config.batch_size);
        if batch.is_empty() {
            return;
        }
        debug!(
            count = batch.len(),
            remaining = self.buffer.len(),
            "flushing buffered records"
        );

        let report = self.dispatcher.dispatch(batch).await;
        if report.cycle_failed() {
            self.retry_state.attempts += 1;
            self.healthy.store(false, Ordering::Relaxed);
            warn!(
                attempt = self.retry_state.attempts,
                max_retries = self.config.max_retries,
                requeued = report.requeued,
                dropped = report.dropped,
                "flush cycle failed, retrying in next cycle"
            );

            if self.retry_state.attempts >= self.config.max_retries {
                let discarded = self.buffer.discard_all();
                error!(
                    discarded,
                    "exhausted retry attempts across cycles, discarding buffered records"
                );
                self.retry_state.attempts = 0;
                self.healthy.store(true, Ordering::Relaxed);
            }
        } else {
            self.retry_state.attempts = 0;
            self.healthy.store(true, Ordering::Relaxed);
        }
    }

    /// Shutdown drain: flushes remaining records batch by batch, abandoning
    /// on the first transport failure rather than looping against a dead
    /// endpoint. The caller bounds the whole run with its stop timeout.
    async fn final_flush(&mut self) {
        let remaining = self.buffer.len();
        if remaining == 0 {
            return;
        }
        info!(remaining, "flushing remaining records before shutdown");

        loop {
            let batch = self.buffer.drain_to(self.config.batch_size);
            if batch.is_empty() {
                break;
            }
            let report = self.dispatcher.dispatch(batch).await;
            if report.cycle_failed() {
                let abandoned = self.buffer.discard_all();
                warn!(abandoned, "final flush failed, abandoning remaining records");
                break;
            }
        }
    }
}
