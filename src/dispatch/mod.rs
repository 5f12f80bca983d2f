pub mod client;

pub use client::{DispatchError, IngestClient, IngestConfig};

use crate::buffer::EvictingBuffer;
use crate::encoder::BatchEncoder;
use crate::record::{FieldValue, LogRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome accounting for one flush cycle's dispatch.
///
/// `(sent + requeued + dropped + abandoned)` accounts for every record the
/// cycle drained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Records acknowledged by the endpoint.
    pub sent: usize,
    /// Records re-admitted to the buffer after a transport failure.
    pub requeued: usize,
    /// Records the buffer refused to re-admit (counted as lost).
    pub dropped: usize,
    /// Records lost to an encoding failure (unrecoverable, not requeued).
    pub abandoned: usize,
    /// (Sub-)batches that hit a transport failure.
    pub failed_batches: usize,
    /// (Sub-)batches dispatched in total.
    pub total_batches: usize,
}

impl DispatchReport {
    /// A cycle counts as failed for retry purposes only when transport
    /// failed; encoding failures say nothing about endpoint health.
    pub fn cycle_failed(&self) -> bool {
        self.failed_batches > 0
    }
}

/// Sends encoded batches to the ingestion endpoint and feeds failures back
/// into the buffer.
pub struct Dispatcher {
    client: IngestClient,
    encoder: BatchEncoder,
    buffer: Arc<EvictingBuffer>,
    custom_fields: BTreeMap<String, FieldValue>,
    merge_custom_fields: bool,
    max_message_size: usize,
}

impl Dispatcher {
    pub fn new(
        client: IngestClient,
        encoder: BatchEncoder,
        buffer: Arc<EvictingBuffer>,
        custom_fields: BTreeMap<String, FieldValue>,
        merge_custom_fields: bool,
        max_message_size: usize,
    ) -> Self {
        Self {
            client,
            encoder,
            buffer,
            custom_fields,
            merge_custom_fields,
            max_message_size,
        }
    }

    /// Dispatches one drained batch, splitting it when the compressed
    /// payload exceeds the maximum message size. Each sub-batch succeeds or
    /// fails independently; a failed (sub-)batch is requeued whole.
    pub async fn dispatch(&self, records: Vec<LogRecord>) -> DispatchReport {
        let mut report = DispatchReport::default();
        if records.is_empty() {
            return report;
        }

        let payload =
            match self
                .encoder
                .encode(&records, &self.custom_fields, self.merge_custom_fields)
            {
                Ok(payload) => payload,
                Err(e) => {
                    error!(error = %e, count = records.len(), "batch encoding failed, abandoning records");
                    report.abandoned = records.len();
                    return report;
                }
            };

        if payload.len() <= self.max_message_size {
            self.send_sub_batch(records, Some(payload), &mut report).await;
            return report;
        }

        debug!(
            payload_bytes = payload.len(),
            max_message_size = self.max_message_size,
            "batch exceeds message size limit, splitting"
        );
        let record_count = records.len();
        let sub_batches = match self.encoder.split_into_sub_batches(
            records,
            &self.custom_fields,
            self.merge_custom_fields,
            self.max_message_size,
        ) {
            Ok(sub_batches) => sub_batches,
            Err(e) => {
                // Splitting re-encodes records one by one, so a failure here
                // is an encoding failure as well.
                error!(error = %e, "sub-batch splitting failed, abandoning cycle");
                report.abandoned = record_count;
                return report;
            }
        };

        for sub_batch in sub_batches {
            self.send_sub_batch(sub_batch, None, &mut report).await;
        }
        report
    }

    /// Sends one (sub-)batch, reusing `payload` when the full batch was
    /// already encoded. Transport failure requeues every record.
    async fn send_sub_batch(
        &self,
        records: Vec<LogRecord>,
        payload: Option<Vec<u8>>,
        report: &mut DispatchReport,
    ) {
        let batch_id = Uuid::new_v4();
        let payload = match payload {
            Some(payload) => payload,
            None => match self
                .encoder
                .encode(&records, &self.custom_fields, self.merge_custom_fields)
            {
                Ok(payload) => payload,
                Err(e) => {
                    error!(%batch_id, error = %e, "sub-batch encoding failed, abandoning records");
                    report.abandoned += records.len();
                    return;
                }
            },
        };

        report.total_batches += 1;
        match self.client.post_batch(payload).await {
            Ok(()) => {
                info!(%batch_id, count = records.len(), "batch acknowledged by ingestion endpoint");
                report.sent += records.len();
            }
            Err(e) if e.is_transport() => {
                warn!(%batch_id, error = %e, count = records.len(), "batch dispatch failed, requeueing");
                report.failed_batches += 1;
                self.requeue(records, report);
            }
            Err(e) => {
                error!(%batch_id, error = %e, count = records.len(), "unrecoverable dispatch error, abandoning records");
                report.abandoned += records.len();
            }
        }
    }

    /// Re-admits a failed batch record by record. Requeued records re-enter
    /// at the back of the buffer and may evict unrelated older records;
    /// records the buffer rejects are dropped, not retried further.
    fn requeue(&self, records: Vec<LogRecord>, report: &mut DispatchReport) {
        let mut dropped = 0usize;
        for record in records {
            if self.buffer.add(record) {
                report.requeued += 1;
            } else {
                dropped += 1;
            }
        }
        report.dropped += dropped;
        if dropped > 0 {
            warn!(dropped, "buffer refused to re-admit failed records");
        }
    }
}
