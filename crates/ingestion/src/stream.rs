//! Feeding records downstream: batch materialization and streaming

use async_channel::Sender;
use contracts::DetectionRecord;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{IngestionError, Result};
use crate::source::RecordSource;

/// Blocking push into a bounded downstream queue
///
/// `Err` hands the record back when the queue is closed.
pub trait RecordSink: Send + 'static {
    fn push_blocking(&self, record: DetectionRecord) -> std::result::Result<(), DetectionRecord>;
}

impl RecordSink for Sender<DetectionRecord> {
    fn push_blocking(&self, record: DetectionRecord) -> std::result::Result<(), DetectionRecord> {
        self.send_blocking(record).map_err(|e| e.into_inner())
    }
}

/// How a streaming run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Source exhausted
    Exhausted,
    /// Cancellation observed before the next read
    Cancelled,
    /// Downstream queue closed
    QueueClosed,
}

/// Streaming run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub forwarded: u64,
    pub end: StreamEnd,
}

/// Result of materializing a source
#[derive(Debug, Clone, PartialEq)]
pub struct BatchLoad {
    pub records: Vec<DetectionRecord>,
    /// `Exhausted`, or `Cancelled` when the token fired mid-load
    pub end: StreamEnd,
}

/// Materialize a whole source (batch mode)
///
/// Cancellation is checked before every read, so a shutdown during a long
/// load stops it with the records read so far.
#[instrument(name = "ingestion_read_all", skip(source, cancel), fields(source = %source.name()))]
pub fn read_all<S: RecordSource + ?Sized>(
    source: &mut S,
    cancel: &CancellationToken,
) -> Result<BatchLoad> {
    let mut records = Vec::new();
    let end = loop {
        if cancel.is_cancelled() {
            break StreamEnd::Cancelled;
        }
        match source.next_record()? {
            Some(record) => records.push(record),
            None => break StreamEnd::Exhausted,
        }
    };

    let dropped = source.metrics().snapshot().rows_dropped;
    match end {
        StreamEnd::Cancelled => {
            warn!(records = records.len(), dropped, "source load cancelled")
        }
        _ => info!(records = records.len(), dropped, "source loaded"),
    }
    Ok(BatchLoad { records, end })
}

/// Run a source on a blocking task, pushing each record into `sink`
///
/// Cancellation is checked before every read; a record already read is still
/// pushed. The task returns once the source is exhausted, the token is
/// cancelled, or the sink closes.
pub fn spawn_stream<S, K>(
    mut source: S,
    sink: K,
    cancel: CancellationToken,
) -> JoinHandle<Result<StreamSummary>>
where
    S: RecordSource + 'static,
    K: RecordSink,
{
    tokio::task::spawn_blocking(move || {
        let name = source.name().to_string();
        let mut forwarded = 0u64;
        info!(source = %name, "streaming source started");

        let end = loop {
            if cancel.is_cancelled() {
                break StreamEnd::Cancelled;
            }

            let record = match source.next_record()? {
                Some(record) => record,
                None => break StreamEnd::Exhausted,
            };

            if let Err(record) = sink.push_blocking(record) {
                warn!(source = %name, key = %record.detection_id, "record queue closed, stopping source");
                break StreamEnd::QueueClosed;
            }
            forwarded += 1;
        };

        info!(source = %name, forwarded, end = ?end, "streaming source stopped");
        Ok(StreamSummary { forwarded, end })
    })
}

/// Await a streaming task, mapping a panicked task to an error
pub async fn join_stream(handle: JoinHandle<Result<StreamSummary>>) -> Result<StreamSummary> {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            debug!(error = %e, "streaming task join failed");
            Err(IngestionError::Task(e.to_string()))
        }
    }
}
