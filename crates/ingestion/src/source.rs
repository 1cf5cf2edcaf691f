//! Record Source trait and the in-memory source

use std::collections::VecDeque;
use std::sync::Arc;

use contracts::DetectionRecord;

use crate::error::Result;
use crate::metrics::SourceMetrics;

/// Pull-based producer of detection records
///
/// A source may be finite (a file) or long-lived. `next_record` is blocking;
/// streaming ingestion drives it from a blocking task. Malformed input is
/// dropped and counted by the source itself; only unrecoverable failures are
/// returned as errors.
pub trait RecordSource: Send {
    /// Name used in logs and metric labels
    fn name(&self) -> &str;

    /// Next valid record, or `None` once exhausted
    fn next_record(&mut self) -> Result<Option<DetectionRecord>>;

    /// Shared counters for this source
    fn metrics(&self) -> Arc<SourceMetrics>;
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn next_record(&mut self) -> Result<Option<DetectionRecord>> {
        (**self).next_record()
    }

    fn metrics(&self) -> Arc<SourceMetrics> {
        (**self).metrics()
    }
}

/// Source backed by records already in memory (tests, replays)
pub struct VecRecordSource {
    name: String,
    records: VecDeque<DetectionRecord>,
    metrics: Arc<SourceMetrics>,
}

impl VecRecordSource {
    pub fn new(name: impl Into<String>, records: Vec<DetectionRecord>) -> Self {
        Self {
            name: name.into(),
            records: records.into(),
            metrics: Arc::new(SourceMetrics::new()),
        }
    }

    /// Records not yet handed out
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl RecordSource for VecRecordSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_record(&mut self) -> Result<Option<DetectionRecord>> {
        let next = self.records.pop_front();
        if next.is_some() {
            self.metrics.record_read();
            self.metrics.record_emitted();
        }
        Ok(next)
    }

    fn metrics(&self) -> Arc<SourceMetrics> {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DetectionPayload, GpsFix};

    fn record(frame: u64) -> DetectionRecord {
        DetectionRecord::ingest(
            DetectionPayload {
                frame_number: frame,
                timestamp_sec: frame as f64 / 30.0,
                pixel_u: 10.0,
                pixel_v: 20.0,
                confidence: 0.9,
                class_name: "stop sign".to_string(),
                video_name: None,
                gps: GpsFix::default(),
            },
            "vehicle-001",
            "session-test",
        )
    }

    #[test]
    fn test_vec_source_yields_in_order() {
        let mut source = VecRecordSource::new("mem", vec![record(1), record(2)]);
        assert_eq!(source.remaining(), 2);

        assert_eq!(source.next_record().unwrap().unwrap().frame_number, 1);
        assert_eq!(source.next_record().unwrap().unwrap().frame_number, 2);
        assert!(source.next_record().unwrap().is_none());
        assert!(source.next_record().unwrap().is_none());

        let snapshot = source.metrics().snapshot();
        assert_eq!(snapshot.rows_read, 2);
        assert_eq!(snapshot.records_emitted, 2);
        assert_eq!(snapshot.rows_dropped, 0);
    }

    #[test]
    fn test_boxed_source_delegates() {
        let mut source: Box<dyn RecordSource> =
            Box::new(VecRecordSource::new("boxed", vec![record(7)]));
        assert_eq!(source.name(), "boxed");
        assert_eq!(source.next_record().unwrap().unwrap().frame_number, 7);
        assert!(source.next_record().unwrap().is_none());
    }
}
