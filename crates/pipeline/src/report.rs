//! Final run report

use std::time::Duration;

use contracts::IngestMode;
use dispatcher::{MetricsSnapshot, PoolStats};
use ingestion::{SourceSnapshot, StreamEnd};
use observability::LatencySummary;

/// Everything known about a finished run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub mode: IngestMode,
    pub session_id: String,
    pub topic: String,

    /// Wall time from start to the final report
    pub duration: Duration,

    /// Delivery counters after the collector drained
    pub metrics: MetricsSnapshot,

    /// Messages still unreported when the flush timeout elapsed
    pub pending_after_flush: usize,

    /// Source row counters
    pub source: SourceSnapshot,

    /// Why the source stopped producing; `None` when it failed
    pub source_end: Option<StreamEnd>,

    /// Error that stopped the source mid-run, if any
    pub source_error: Option<String>,

    pub workers: PoolStats,

    /// Ack latency and failures by kind
    pub latency: LatencySummary,

    /// Whether shutdown was requested from outside
    pub interrupted: bool,
}

impl PipelineReport {
    /// Acked messages per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.metrics.acked as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.metrics.success_rate()
    }

    /// Queued records no worker picked up before shutdown
    pub fn unsent(&self) -> u64 {
        self.metrics.queued.saturating_sub(self.metrics.sent)
    }

    /// No failures and nothing left pending
    pub fn is_success(&self) -> bool {
        self.metrics.failed == 0 && self.metrics.pending == 0 && self.pending_after_flush == 0
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                  {:<9} Ingestion Report                   ║", self.mode.to_string());
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Session: {}", self.session_id);
        println!("   ├─ Topic: {}", self.topic);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Throughput: {:.2} msg/s", self.throughput());
        println!("   ├─ Success rate: {:.2}%", self.success_rate());
        println!("   └─ Workers: {}", self.workers.workers.len());

        println!("\n📥 Source");
        println!("   ├─ Rows read: {}", self.source.rows_read);
        println!("   ├─ Records emitted: {}", self.source.records_emitted);
        println!("   ├─ Rows dropped: {}", self.source.rows_dropped);
        match (&self.source_end, &self.source_error) {
            (_, Some(e)) => println!("   └─ Failed: {e}"),
            (Some(end), None) => println!("   └─ Stopped: {end:?}"),
            (None, None) => println!("   └─ Stopped: unknown"),
        }

        println!("\n📤 Delivery");
        let entries = self.metrics.entries();
        for (i, (name, value)) in entries.iter().enumerate() {
            let prefix = if i + 1 == entries.len() { "└─" } else { "├─" };
            println!("   {prefix} {name}: {value}");
        }

        if self.pending_after_flush > 0 {
            println!(
                "\n⚠️  {} messages still pending after flush timeout",
                self.pending_after_flush
            );
        }
        if self.unsent() > 0 {
            println!("\n⚠️  {} queued records were never sent", self.unsent());
        }

        println!("\n⏱  {}", self.latency);
    }
}
