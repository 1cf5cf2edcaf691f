//! Transport seam and per-message delivery reporter

use std::sync::Arc;
use std::time::Instant;

use contracts::{DeliveryError, DeliveryEvent, LogPosition, Message, MessageId};
use tokio::sync::{mpsc, watch};
use tracing::{error, trace};

/// Receiving end of the delivery event stream
pub type DeliveryEvents = mpsc::Receiver<DeliveryEvent>;

/// Broker transport
///
/// `submit` either buffers the message (and takes ownership of the reporter,
/// which must eventually be reported or dropped) or rejects it synchronously,
/// handing both back.
pub trait BrokerTransport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// Buffer a message for delivery
    fn submit(&self, message: Message, reporter: DeliveryReporter) -> Result<(), SubmitError>;

    /// Stop accepting messages; already buffered messages are still delivered
    fn close(&self);
}

/// Synchronous rejection from a transport
#[derive(Debug)]
pub struct SubmitError {
    pub error: DeliveryError,
    pub message: Message,
    pub reporter: DeliveryReporter,
}

impl SubmitError {
    pub fn new(error: DeliveryError, message: Message, reporter: DeliveryReporter) -> Self {
        Self {
            error,
            message,
            reporter,
        }
    }
}

/// One-shot handle for reporting the outcome of an accepted message
///
/// Reporting consumes the handle. Dropping it unreported emits a
/// `ReportDropped` failure, so every accepted send yields exactly one event.
/// The client's in-flight count is decremented only after the event is queued.
#[derive(Debug)]
pub struct DeliveryReporter {
    message_id: MessageId,
    key: String,
    accepted_at: Instant,
    events: mpsc::Sender<DeliveryEvent>,
    in_flight: Arc<watch::Sender<usize>>,
    armed: bool,
}

impl DeliveryReporter {
    pub(crate) fn new(
        message_id: MessageId,
        key: String,
        events: mpsc::Sender<DeliveryEvent>,
        in_flight: Arc<watch::Sender<usize>>,
    ) -> Self {
        in_flight.send_modify(|n| *n += 1);
        Self {
            message_id,
            key,
            accepted_at: Instant::now(),
            events,
            in_flight,
            armed: true,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Report the broker's verdict
    pub async fn report(mut self, result: Result<LogPosition, DeliveryError>) {
        let event = self.event(result);
        if self.events.send(event).await.is_err() {
            trace!(key = %self.key, "delivery event stream closed");
        }
        self.armed = false;
    }

    /// Withdraw a reporter whose message was never accepted
    pub(crate) fn release(mut self) {
        self.armed = false;
    }

    fn event(&self, result: Result<LogPosition, DeliveryError>) -> DeliveryEvent {
        let (position, result) = match result {
            Ok(position) => (Some(position), Ok(())),
            Err(e) => (None, Err(e)),
        };
        DeliveryEvent {
            message_id: self.message_id,
            key: self.key.clone(),
            position,
            result,
            latency: self.accepted_at.elapsed(),
        }
    }
}

fn decrement(in_flight: &watch::Sender<usize>) {
    in_flight.send_modify(|n| *n = n.saturating_sub(1));
}

impl Drop for DeliveryReporter {
    fn drop(&mut self) {
        if self.armed {
            let event = self.event(Err(DeliveryError::ReportDropped));
            match self.events.try_send(event) {
                Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    if let Ok(handle) = tokio::runtime::Handle::try_current() {
                        let events = self.events.clone();
                        let in_flight = self.in_flight.clone();
                        handle.spawn(async move {
                            let _ = events.send(event).await;
                            decrement(&in_flight);
                        });
                        return;
                    }
                    error!(key = %self.key, message_id = %self.message_id, "delivery event lost: stream full outside runtime");
                }
            }
        }
        decrement(&self.in_flight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(
        id: u64,
    ) -> (
        DeliveryReporter,
        mpsc::Receiver<DeliveryEvent>,
        Arc<watch::Sender<usize>>,
    ) {
        let (tx, rx) = mpsc::channel(8);
        let (in_flight, _) = watch::channel(0usize);
        let in_flight = Arc::new(in_flight);
        let r = DeliveryReporter::new(MessageId(id), format!("key-{id}"), tx, in_flight.clone());
        (r, rx, in_flight)
    }

    #[tokio::test]
    async fn test_report_ack() {
        let (r, mut rx, in_flight) = reporter(1);
        assert_eq!(*in_flight.borrow(), 1);

        r.report(Ok(LogPosition {
            partition: 2,
            offset: 7,
        }))
        .await;

        let event = rx.recv().await.unwrap();
        assert!(event.is_ack());
        assert_eq!(event.message_id, MessageId(1));
        assert_eq!(event.key, "key-1");
        assert_eq!(
            event.position,
            Some(LogPosition {
                partition: 2,
                offset: 7
            })
        );
        assert_eq!(*in_flight.borrow(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_unreported_emits_failure() {
        let (r, mut rx, in_flight) = reporter(2);
        drop(r);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.result, Err(DeliveryError::ReportDropped));
        assert_eq!(*in_flight.borrow(), 0);
    }

    #[tokio::test]
    async fn test_release_emits_nothing() {
        let (r, mut rx, in_flight) = reporter(3);
        r.release();

        assert!(rx.try_recv().is_err());
        assert_eq!(*in_flight.borrow(), 0);
    }
}
