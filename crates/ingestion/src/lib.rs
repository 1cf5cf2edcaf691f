//! # Ingestion
//!
//! Detection record sources.
//!
//! Responsibilities:
//! - Read detection rows (CSV file or in-memory) into `DetectionRecord`s
//! - Drop and count malformed rows without stopping the run
//! - Batch mode: materialize the whole source
//! - Streaming mode: run the source on a blocking task into a bounded queue
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{spawn_stream, CsvRecordSource};
//!
//! let source = CsvRecordSource::open(path, "vehicle-001", session_id)?;
//! let handle = spawn_stream(source, queue_sender, cancel.clone());
//! ```

mod csv_source;
mod error;
mod metrics;
mod source;
mod stream;

pub use csv_source::CsvRecordSource;
pub use error::{IngestionError, Result};
pub use metrics::{SourceMetrics, SourceSnapshot};
pub use source::{RecordSource, VecRecordSource};
pub use stream::{
    join_stream, read_all, spawn_stream, BatchLoad, RecordSink, StreamEnd, StreamSummary,
};
