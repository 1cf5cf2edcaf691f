//! Per-message delivery state
//!
//! Only the sending worker and the collector move messages between states;
//! terminal entries are discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{DeliveryState, MessageId};
use tracing::warn;

#[derive(Debug)]
struct Entry {
    key: String,
    state: DeliveryState,
}

/// Tracks non-terminal messages by pipeline-local id
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    next_id: AtomicU64,
    entries: Mutex<HashMap<MessageId, Entry>>,
    illegal_transitions: AtomicU64,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<MessageId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a message taken by a worker; returns its fresh id
    pub fn enqueue(&self, key: &str) -> MessageId {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().insert(
            id,
            Entry {
                key: key.to_string(),
                state: DeliveryState::Queued,
            },
        );
        id
    }

    pub fn mark_sent(&self, id: MessageId, attempt: u32) -> bool {
        self.transition(id, DeliveryState::Sent(attempt))
    }

    pub fn mark_acked(&self, id: MessageId) -> bool {
        self.transition(id, DeliveryState::Acked)
    }

    pub fn mark_failed(&self, id: MessageId) -> bool {
        self.transition(id, DeliveryState::Failed)
    }

    fn transition(&self, id: MessageId, next: DeliveryState) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&id) else {
            self.illegal_transitions.fetch_add(1, Ordering::Relaxed);
            warn!(message_id = %id, next = ?next, "state change for unknown or finished message");
            return false;
        };

        if !entry.state.can_transition_to(next) {
            self.illegal_transitions.fetch_add(1, Ordering::Relaxed);
            warn!(message_id = %id, key = %entry.key, from = ?entry.state, to = ?next, "illegal delivery state transition");
            return false;
        }

        if next.is_terminal() {
            entries.remove(&id);
        } else {
            entry.state = next;
        }
        true
    }

    /// Current state; `None` once terminal (or never registered)
    pub fn state(&self, id: MessageId) -> Option<DeliveryState> {
        self.entries().get(&id).map(|e| e.state)
    }

    /// Messages not yet acked or failed
    pub fn outstanding(&self) -> usize {
        self.entries().len()
    }

    /// Keys of messages not yet acked or failed
    pub fn outstanding_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().values().map(|e| e.key.clone()).collect();
        keys.sort();
        keys
    }

    pub fn illegal_transitions(&self) -> u64 {
        self.illegal_transitions.load(Ordering::Relaxed)
    }
}
