//! Pipeline Controller
//!
//! Owns one run: builds the delivery machinery, drives batch or streaming
//! ingestion through the worker pool, then shuts down in a fixed order:
//! stop the source, join the workers, flush, close the client, drain the
//! collector, report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use broker::{build_transport, BrokerTransport, DeliveryClient};
use contracts::{generate_session_id, IngestConfig, IngestMode};
use dispatcher::{
    spawn_batch_feeder, work_queue, Collector, DeliveryMetrics, DeliveryTracker, MetricsSnapshot,
    RetryPolicy, WorkerContext, WorkerPool,
};
use ingestion::{
    join_stream, read_all, spawn_stream, BatchLoad, CsvRecordSource, RecordSource, StreamEnd,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::report::PipelineReport;
use crate::shutdown::ShutdownHandle;

/// Records to deliver, by ingestion mode
enum Work<S> {
    Batch(BatchLoad),
    Streaming(S),
}

/// Task feeding the queue for the duration of a run
enum Feeder {
    Batch {
        total: u64,
        load_end: StreamEnd,
        handle: JoinHandle<u64>,
    },
    Streaming(JoinHandle<ingestion::Result<ingestion::StreamSummary>>),
}

/// Pipeline Controller
pub struct PipelineController {
    config: IngestConfig,
    session_id: String,
    flush_timeout: Duration,
    transport: Option<Arc<dyn BrokerTransport>>,
    metrics: Arc<DeliveryMetrics>,
    tracker: Arc<DeliveryTracker>,
    shutdown: ShutdownHandle,
}

impl PipelineController {
    /// Create a controller; a session id is generated when none is configured
    pub fn new(config: IngestConfig) -> Self {
        let session_id = config
            .source
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(generate_session_id);
        let flush_timeout = config.pipeline.flush_timeout();

        Self {
            config,
            session_id,
            flush_timeout,
            transport: None,
            metrics: Arc::new(DeliveryMetrics::new()),
            tracker: Arc::new(DeliveryTracker::new()),
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Use this transport instead of building one from the broker section
    pub fn with_transport(mut self, transport: Arc<dyn BrokerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the configured flush timeout for this run
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Trigger for stopping the run from outside (signals, tests)
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Live counters, readable while the run is in progress
    pub fn metrics_handle(&self) -> Arc<DeliveryMetrics> {
        self.metrics.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Open the CSV source named in the configuration
    pub fn open_source(&self) -> Result<CsvRecordSource> {
        let path = self
            .config
            .source
            .csv_path
            .as_deref()
            .ok_or_else(|| PipelineError::config("source.csv_path is not set"))?;
        Ok(CsvRecordSource::open(
            path,
            self.config.source.vehicle_id.clone(),
            self.session_id.clone(),
        )?)
    }

    /// Run to completion, or until shutdown is requested
    ///
    /// Per-record failures end up in the report. Only failures to load the
    /// source, build the transport or run the pool are returned as errors.
    #[instrument(
        name = "pipeline_run",
        skip_all,
        fields(mode = %self.config.pipeline.mode, session = %self.session_id)
    )]
    pub async fn run<S>(self, source: S) -> Result<PipelineReport>
    where
        S: RecordSource + 'static,
    {
        let started = Instant::now();
        let settings = self.config.pipeline.clone();
        if settings.worker_count == 0 {
            return Err(PipelineError::config("worker_count must be at least 1"));
        }

        let source_metrics = source.metrics();
        let source_name = source.name().to_string();

        // Batch mode materializes the whole source before any send
        let work = match settings.mode {
            IngestMode::Batch => Work::Batch(load_batch(source, self.shutdown.token()).await?),
            IngestMode::Streaming => Work::Streaming(source),
        };

        let transport = match self.transport.clone() {
            Some(transport) => transport,
            None => build_transport(&self.config.broker)?,
        };
        let transport_name = transport.name().to_string();
        let (client, events) = DeliveryClient::new(transport, settings.event_buffer);
        let client = Arc::new(client);

        // Collector first, so no delivery event is produced without a consumer
        let collector = Collector::spawn(events, self.tracker.clone(), self.metrics.clone());

        let (sender, receiver) = work_queue(settings.queue_capacity, self.metrics.clone());
        let ctx = Arc::new(WorkerContext {
            client: client.clone(),
            tracker: self.tracker.clone(),
            metrics: self.metrics.clone(),
            policy: RetryPolicy::from_settings(&settings),
            topic: self.config.broker.topic.clone(),
        });
        let cancel = self.shutdown.token();
        let pool = WorkerPool::spawn(settings.worker_count, receiver, ctx, cancel.clone())?;

        info!(
            source = %source_name,
            transport = %transport_name,
            topic = %self.config.broker.topic,
            workers = settings.worker_count,
            queue_capacity = settings.queue_capacity,
            "pipeline started"
        );

        // The feeder owns the only sender: the queue closes when it finishes
        let feeder = match work {
            Work::Batch(BatchLoad { records, end }) => Feeder::Batch {
                total: records.len() as u64,
                load_end: end,
                handle: spawn_batch_feeder(records, sender, cancel.clone()),
            },
            Work::Streaming(source) => Feeder::Streaming(spawn_stream(source, sender, cancel)),
        };

        let workers = pool.join().await;
        let (source_end, source_error) = finish_feeder(feeder, self.shutdown.is_requested()).await;

        let pending_after_flush = client.flush(self.flush_timeout).await;
        if pending_after_flush > 0 {
            warn!(
                pending = pending_after_flush,
                timeout_secs = self.flush_timeout.as_secs_f64(),
                "flush timed out, reporting partial completion"
            );
        }
        client.close();
        let collected = collector.stop().await;

        let workers = workers?;
        let collected = collected?;
        let metrics = self.metrics.snapshot();
        observability::record_pending(metrics.pending);

        let illegal = self.tracker.illegal_transitions();
        if illegal > 0 {
            warn!(illegal, "illegal delivery state transitions observed");
        }

        let report = PipelineReport {
            mode: settings.mode,
            session_id: self.session_id.clone(),
            topic: self.config.broker.topic.clone(),
            duration: started.elapsed(),
            metrics,
            pending_after_flush,
            source: source_metrics.snapshot(),
            source_end,
            source_error,
            workers,
            latency: collected.latency,
            interrupted: self.shutdown.is_requested(),
        };

        info!(
            metrics = %report.metrics,
            duration_secs = report.duration.as_secs_f64(),
            throughput = %format!("{:.2}", report.throughput()),
            success = report.is_success(),
            "pipeline finished"
        );
        Ok(report)
    }
}

/// Read a whole source on the blocking pool, stopping early on shutdown
async fn load_batch<S>(mut source: S, cancel: CancellationToken) -> Result<BatchLoad>
where
    S: RecordSource + 'static,
{
    tokio::task::spawn_blocking(move || read_all(&mut source, &cancel))
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
        .map_err(PipelineError::from)
}

async fn finish_feeder(feeder: Feeder, cancelled: bool) -> (Option<StreamEnd>, Option<String>) {
    match feeder {
        Feeder::Batch {
            total,
            load_end,
            handle,
        } => match handle.await {
            Ok(_) if load_end == StreamEnd::Cancelled => (Some(StreamEnd::Cancelled), None),
            Ok(fed) if fed == total => (Some(StreamEnd::Exhausted), None),
            Ok(_) if cancelled => (Some(StreamEnd::Cancelled), None),
            Ok(_) => (Some(StreamEnd::QueueClosed), None),
            Err(e) => {
                error!(error = %e, "batch feeder failed");
                (None, Some(e.to_string()))
            }
        },
        Feeder::Streaming(handle) => match join_stream(handle).await {
            Ok(summary) => (Some(summary.end), None),
            Err(e) => {
                error!(error = %e, "record source failed mid-stream");
                (None, Some(e.to_string()))
            }
        },
    }
}
