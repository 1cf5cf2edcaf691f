//! Delivery events and per-message delivery state

use std::time::Duration;

use crate::{DeliveryError, MessageId};

/// Per-message delivery state
///
/// `Queued -> Sent(attempt) -> {Acked | Failed}`. Only the sending worker and
/// the report collector move a message between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Taken by a worker, no attempt made yet
    Queued,
    /// Attempt `n` handed to the delivery client (0 = initial send)
    Sent(u32),
    /// Broker acknowledged the message
    Acked,
    /// Permanently failed (aborted by retry policy or failed asynchronously)
    Failed,
}

impl DeliveryState {
    /// Terminal states are never left
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acked | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: DeliveryState) -> bool {
        match (self, next) {
            (Self::Queued, Self::Sent(_)) => true,
            (Self::Queued, Self::Failed) => true,
            (Self::Sent(prev), Self::Sent(n)) => n > *prev,
            (Self::Sent(_), Self::Acked | Self::Failed) => true,
            _ => false,
        }
    }
}

/// Where the broker placed a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    pub partition: i32,
    pub offset: i64,
}

/// Asynchronous delivery report, one per accepted send
#[derive(Debug, Clone)]
pub struct DeliveryEvent {
    /// Pipeline-local id of the message
    pub message_id: MessageId,

    /// Message key (detection id)
    pub key: String,

    /// Log position if the broker assigned one
    pub position: Option<LogPosition>,

    /// Ack or terminal error
    pub result: Result<(), DeliveryError>,

    /// Time between acceptance and report
    pub latency: Duration,
}

impl DeliveryEvent {
    pub fn is_ack(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use DeliveryState::*;

        assert!(Queued.can_transition_to(Sent(0)));
        assert!(Sent(0).can_transition_to(Sent(1)));
        assert!(Sent(2).can_transition_to(Acked));
        assert!(Sent(2).can_transition_to(Failed));
        assert!(Queued.can_transition_to(Failed));

        assert!(!Sent(1).can_transition_to(Sent(1)));
        assert!(!Queued.can_transition_to(Acked));
        assert!(!Acked.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Sent(3)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(DeliveryState::Acked.is_terminal());
        assert!(DeliveryState::Failed.is_terminal());
        assert!(!DeliveryState::Queued.is_terminal());
        assert!(!DeliveryState::Sent(0).is_terminal());
    }
}
