//! Record source metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Source-side counters, shared between the reading task and the report
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Data rows read (header excluded)
    pub rows_read: AtomicU64,

    /// Records handed downstream
    pub records_emitted: AtomicU64,

    /// Rows dropped as malformed
    pub rows_dropped: AtomicU64,
}

impl SourceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted(&self) {
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped row (also exported to Prometheus)
    pub fn record_dropped(&self, source_name: &str) {
        self.rows_dropped.fetch_add(1, Ordering::Relaxed);
        observability::record_rows_dropped(source_name, 1);
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            rows_read: self.rows_read.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SourceMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub rows_read: u64,
    pub records_emitted: u64,
    pub rows_dropped: u64,
}
