//! Delivery metrics
//!
//! Append-only counters shared by workers, the collector and the report.
//! `pending = sent - acked - failed`; snapshots load the terminal counters
//! before `sent`, so a concurrent reader never sees a negative pending count.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared delivery counters
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    /// Records accepted into the work queue
    queued: AtomicU64,
    /// Messages whose send sequence started (once per message)
    sent: AtomicU64,
    /// Messages acknowledged by the broker
    acked: AtomicU64,
    /// Messages aborted or failed asynchronously
    failed: AtomicU64,
    /// Retry attempts performed
    retries: AtomicU64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_acked(&self) -> u64 {
        self.acked.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let acked = self.acked.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let retries = self.retries.load(Ordering::SeqCst);
        let sent = self.sent.load(Ordering::SeqCst);
        let queued = self.queued.load(Ordering::SeqCst);

        MetricsSnapshot {
            queued,
            sent,
            acked,
            failed,
            retries,
            pending: sent.saturating_sub(acked + failed),
        }
    }
}

/// Point-in-time metrics report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queued: u64,
    pub sent: u64,
    pub acked: u64,
    pub failed: u64,
    pub retries: u64,
    pub pending: u64,
}

impl MetricsSnapshot {
    /// Named counters, in report order
    pub fn entries(&self) -> [(&'static str, u64); 6] {
        [
            ("queued", self.queued),
            ("sent", self.sent),
            ("acked", self.acked),
            ("failed", self.failed),
            ("retries", self.retries),
            ("pending", self.pending),
        ]
    }

    /// Acked share of terminal messages, in percent
    pub fn success_rate(&self) -> f64 {
        let done = self.acked + self.failed;
        if done == 0 {
            0.0
        } else {
            self.acked as f64 / done as f64 * 100.0
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}
