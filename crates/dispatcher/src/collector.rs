//! Delivery Report Collector
//!
//! Single task draining the delivery event stream for the pipeline's lifetime.

use std::sync::Arc;

use broker::DeliveryEvents;
use contracts::DeliveryEvent;
use observability::{DeliveryLatency, LatencySummary};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::error::DispatcherError;
use crate::metrics::DeliveryMetrics;
use crate::state::DeliveryTracker;

/// Acks between progress log lines
const PROGRESS_EVERY: u64 = 1000;

/// What the collector saw
#[derive(Debug, Clone, Default)]
pub struct CollectorSummary {
    /// Events processed
    pub events: u64,
    /// Ack latency and failure breakdown
    pub latency: LatencySummary,
}

/// Handle to the running collector task
pub struct Collector {
    stop: CancellationToken,
    handle: JoinHandle<CollectorSummary>,
}

impl Collector {
    /// Start draining `events`
    pub fn spawn(
        events: DeliveryEvents,
        tracker: Arc<DeliveryTracker>,
        metrics: Arc<DeliveryMetrics>,
    ) -> Self {
        let stop = CancellationToken::new();
        let handle = tokio::spawn(collect_loop(events, tracker, metrics, stop.clone()));
        Self { stop, handle }
    }

    /// Stop after draining events already queued
    #[instrument(name = "collector_stop", skip(self))]
    pub async fn stop(self) -> Result<CollectorSummary, DispatcherError> {
        self.stop.cancel();
        self.join().await
    }

    /// Wait for the event stream to close
    pub async fn join(self) -> Result<CollectorSummary, DispatcherError> {
        self.handle
            .await
            .map_err(|e| DispatcherError::CollectorFailed {
                message: e.to_string(),
            })
    }
}

#[instrument(name = "collector_loop", skip_all)]
async fn collect_loop(
    mut events: DeliveryEvents,
    tracker: Arc<DeliveryTracker>,
    metrics: Arc<DeliveryMetrics>,
    stop: CancellationToken,
) -> CollectorSummary {
    let mut latency = DeliveryLatency::new();
    let mut processed = 0u64;
    debug!("collector started");

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => {
                    handle_event(&event, &tracker, &metrics, &mut latency);
                    processed += 1;
                }
                None => {
                    debug!("delivery event stream closed");
                    break;
                }
            },
            _ = stop.cancelled() => {
                while let Ok(event) = events.try_recv() {
                    handle_event(&event, &tracker, &metrics, &mut latency);
                    processed += 1;
                }
                break;
            }
        }
    }

    let snapshot = metrics.snapshot();
    observability::record_pending(snapshot.pending);
    info!(events = processed, acked = snapshot.acked, failed = snapshot.failed, "collector stopped");

    CollectorSummary {
        events: processed,
        latency: latency.summary(),
    }
}

fn handle_event(
    event: &DeliveryEvent,
    tracker: &DeliveryTracker,
    metrics: &DeliveryMetrics,
    latency: &mut DeliveryLatency,
) {
    latency.observe(event);
    observability::record_delivery(event.is_ack());

    match &event.result {
        Ok(()) => {
            let acked = metrics.record_acked();
            tracker.mark_acked(event.message_id);
            observability::record_delivery_latency_ms(event.latency.as_secs_f64() * 1000.0);

            if acked % PROGRESS_EVERY == 0 {
                let snapshot = metrics.snapshot();
                observability::record_pending(snapshot.pending);
                info!(acked, failed = snapshot.failed, pending = snapshot.pending, "delivery progress");
            }
        }
        Err(err) => {
            metrics.record_failed();
            tracker.mark_failed(event.message_id);
            error!(
                key = %event.key,
                message_id = %event.message_id,
                partition = ?event.position.map(|p| p.partition),
                offset = ?event.position.map(|p| p.offset),
                error = %err,
                "delivery failed"
            );
        }
    }
}
