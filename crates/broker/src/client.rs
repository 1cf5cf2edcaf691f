//! Delivery Client
//!
//! Thin, thread-safe front of a [`BrokerTransport`]: synchronous acceptance,
//! asynchronous delivery events, bounded flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{DeliveryError, DeliveryEvent, Message, MessageId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::error::SendError;
use crate::transport::{BrokerTransport, DeliveryEvents, DeliveryReporter};

/// Delivery Client
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct DeliveryClient {
    transport: Arc<dyn BrokerTransport>,
    events: mpsc::Sender<DeliveryEvent>,
    in_flight: Arc<watch::Sender<usize>>,
    closed: AtomicBool,
}

impl DeliveryClient {
    /// Create a client and the event stream it reports on
    ///
    /// `event_buffer` bounds the number of undrained delivery events.
    pub fn new(transport: Arc<dyn BrokerTransport>, event_buffer: usize) -> (Self, DeliveryEvents) {
        let (events, rx) = mpsc::channel(event_buffer.max(1));
        let (in_flight, _) = watch::channel(0usize);
        let client = Self {
            transport,
            events,
            in_flight: Arc::new(in_flight),
            closed: AtomicBool::new(false),
        };
        (client, rx)
    }

    /// Hand a message to the transport
    ///
    /// `Ok` means the message was buffered and exactly one delivery event will
    /// follow. On `Err` no event is produced and the message is returned.
    pub fn send(&self, message: Message, id: MessageId) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError {
                error: DeliveryError::Closed,
                message,
            });
        }

        let reporter = DeliveryReporter::new(
            id,
            message.key.clone(),
            self.events.clone(),
            self.in_flight.clone(),
        );

        self.transport.submit(message, reporter).map_err(|rejected| {
            rejected.reporter.release();
            SendError {
                error: rejected.error,
                message: rejected.message,
            }
        })
    }

    /// Messages accepted but not yet reported
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until every accepted message has been reported, or `timeout`
    /// elapses. Returns the number still outstanding.
    #[instrument(name = "delivery_client_flush", skip(self), fields(transport = %self.transport.name()))]
    pub async fn flush(&self, timeout: Duration) -> usize {
        let mut rx = self.in_flight.subscribe();
        let drained = tokio::time::timeout(timeout, async {
            rx.wait_for(|n| *n == 0).await.is_ok()
        })
        .await;

        match drained {
            Ok(true) => {
                debug!("flush complete");
                0
            }
            _ => {
                let pending = self.in_flight();
                warn!(pending, timeout_ms = timeout.as_millis() as u64, "flush timed out");
                pending
            }
        }
    }

    /// Reject further sends and release the transport
    ///
    /// Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.transport.close();
            info!(transport = %self.transport.name(), "delivery client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
