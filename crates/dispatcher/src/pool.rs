//! Worker Pool
//!
//! Exactly W workers over one bounded multi-consumer work queue. Each worker
//! turns a record into a message and drives it through the retry policy
//! until the client accepts it or the policy aborts.

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use broker::DeliveryClient;
use contracts::{DeliveryError, DetectionRecord, Message};
use ingestion::RecordSink;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::DeliveryMetrics;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::state::DeliveryTracker;

/// Create the bounded work queue
pub fn work_queue(capacity: usize, metrics: Arc<DeliveryMetrics>) -> (WorkSender, WorkReceiver) {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    (WorkSender { tx, metrics }, WorkReceiver { rx })
}

/// Producer side of the work queue; counts every accepted record as queued
#[derive(Clone)]
pub struct WorkSender {
    tx: Sender<DetectionRecord>,
    metrics: Arc<DeliveryMetrics>,
}

impl WorkSender {
    /// Wait for room and enqueue; hands the record back if the queue closed
    pub async fn send(&self, record: DetectionRecord) -> Result<(), DetectionRecord> {
        self.tx.send(record).await.map_err(|e| e.into_inner())?;
        self.on_queued();
        Ok(())
    }

    /// Stop accepting records; workers drain what is already queued
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    fn on_queued(&self) {
        self.metrics.record_queued();
        observability::record_message_queued();
    }
}

impl RecordSink for WorkSender {
    fn push_blocking(&self, record: DetectionRecord) -> Result<(), DetectionRecord> {
        self.tx.send_blocking(record).map_err(|e| e.into_inner())?;
        self.on_queued();
        Ok(())
    }
}

/// Consumer side of the work queue
#[derive(Clone)]
pub struct WorkReceiver {
    rx: Receiver<DetectionRecord>,
}

/// Everything a worker needs, shared by all workers
pub struct WorkerContext {
    pub client: Arc<DeliveryClient>,
    pub tracker: Arc<DeliveryTracker>,
    pub metrics: Arc<DeliveryMetrics>,
    pub policy: RetryPolicy,
    pub topic: String,
}

/// Per-worker counters, returned on join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker_id: usize,
    /// Records taken from the queue
    pub pulled: u64,
    /// Messages accepted by the client
    pub accepted: u64,
    /// Messages given up on by the retry policy
    pub aborted: u64,
    /// Retry attempts made
    pub retries: u64,
}

/// Aggregate of all workers
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub workers: Vec<WorkerStats>,
}

impl PoolStats {
    pub fn pulled(&self) -> u64 {
        self.workers.iter().map(|w| w.pulled).sum()
    }

    pub fn accepted(&self) -> u64 {
        self.workers.iter().map(|w| w.accepted).sum()
    }

    pub fn aborted(&self) -> u64 {
        self.workers.iter().map(|w| w.aborted).sum()
    }

    pub fn retries(&self) -> u64 {
        self.workers.iter().map(|w| w.retries).sum()
    }
}

/// Running worker tasks
pub struct WorkerPool {
    handles: Vec<(usize, JoinHandle<WorkerStats>)>,
}

impl WorkerPool {
    /// Spawn `workers` tasks consuming `queue`
    ///
    /// Workers stop when the queue is closed and drained, or when `cancel`
    /// fires. Cancellation is checked before every pull; a retry sequence in
    /// progress still runs to a terminal decision.
    #[instrument(name = "worker_pool_spawn", skip(queue, ctx, cancel))]
    pub fn spawn(
        workers: usize,
        queue: WorkReceiver,
        ctx: Arc<WorkerContext>,
        cancel: CancellationToken,
    ) -> Result<Self, DispatcherError> {
        if workers == 0 {
            return Err(DispatcherError::NoWorkers);
        }

        let handles = (0..workers)
            .map(|worker_id| {
                let handle = tokio::spawn(worker_loop(
                    worker_id,
                    queue.rx.clone(),
                    ctx.clone(),
                    cancel.clone(),
                ));
                (worker_id, handle)
            })
            .collect();

        info!(workers, "worker pool started");
        Ok(Self { handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker
    ///
    /// All workers are joined even if one failed; the first failure is returned.
    #[instrument(name = "worker_pool_join", skip(self), fields(workers = self.handles.len()))]
    pub async fn join(self) -> Result<PoolStats, DispatcherError> {
        let mut stats = PoolStats::default();
        let mut first_error = None;

        for (worker_id, handle) in self.handles {
            match handle.await {
                Ok(worker) => stats.workers.push(worker),
                Err(e) => {
                    error!(worker_id, error = %e, "worker terminated abnormally");
                    first_error.get_or_insert(DispatcherError::worker_failed(worker_id, e.to_string()));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            pulled = stats.pulled(),
            accepted = stats.accepted(),
            aborted = stats.aborted(),
            retries = stats.retries(),
            "worker pool finished"
        );
        Ok(stats)
    }
}

#[instrument(name = "worker_loop", skip(rx, ctx, cancel))]
async fn worker_loop(
    worker_id: usize,
    rx: Receiver<DetectionRecord>,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
) -> WorkerStats {
    let mut stats = WorkerStats {
        worker_id,
        ..Default::default()
    };
    debug!("worker started");

    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("worker cancelled");
                break;
            }
            next = rx.recv() => match next {
                Ok(record) => record,
                Err(_) => break,
            },
        };

        stats.pulled += 1;
        ctx.deliver(record, &mut stats).await;
    }

    debug!(pulled = stats.pulled, accepted = stats.accepted, aborted = stats.aborted, "worker stopped");
    stats
}

impl WorkerContext {
    /// Send one record until accepted or aborted
    async fn deliver(&self, record: DetectionRecord, stats: &mut WorkerStats) {
        let id = self.tracker.enqueue(&record.detection_id);
        self.metrics.record_sent();

        let mut message = match Message::from_record(&record, &self.topic) {
            Ok(message) => message,
            Err(e) => {
                let error = DeliveryError::invalid(e.to_string());
                self.abort(id, &record.detection_id, 0, &error, stats);
                return;
            }
        };

        let mut attempt = 0u32;
        loop {
            self.tracker.mark_sent(id, attempt);

            let (error, rejected) = match self.client.send(message, id) {
                Ok(()) => {
                    stats.accepted += 1;
                    return;
                }
                Err(e) => e.into_parts(),
            };

            attempt += 1;
            match self.policy.decide(&error, attempt) {
                RetryDecision::Retry(delay) => {
                    stats.retries += 1;
                    self.metrics.record_retry();
                    observability::record_retry(&error);
                    debug!(
                        key = %rejected.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "send rejected, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    message = rejected;
                }
                RetryDecision::Abort => {
                    self.abort(id, &rejected.key, attempt, &error, stats);
                    return;
                }
            }
        }
    }

    fn abort(
        &self,
        id: contracts::MessageId,
        key: &str,
        attempts: u32,
        error: &DeliveryError,
        stats: &mut WorkerStats,
    ) {
        stats.aborted += 1;
        self.metrics.record_failed();
        self.tracker.mark_failed(id);
        observability::record_send_aborted(error);
        if error.is_retriable() {
            warn!(key = %key, message_id = %id, attempts, error = %error, "retries exhausted, giving up");
        } else {
            error!(key = %key, message_id = %id, attempts, error = %error, "non-retriable send error");
        }
    }
}

/// Feed materialized records into the queue (batch mode)
///
/// Stops early on cancellation or when the queue closes. Returns how many
/// records were enqueued.
pub fn spawn_batch_feeder(
    records: Vec<DetectionRecord>,
    sender: WorkSender,
    cancel: CancellationToken,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let total = records.len();
        let mut fed = 0u64;
        for record in records {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = sender.send(record) => sent,
            };
            if sent.is_err() {
                warn!("work queue closed before batch was fully fed");
                break;
            }
            fed += 1;
        }
        info!(fed, total, "batch feeder finished");
        fed
    })
}
