//! IngestConfig - Config Loader output
//!
//! Pipeline tuning, record source and broker transport settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Default topic for detection messages
pub const DEFAULT_TOPIC: &str = "traffic-sign-detections";

/// Default vehicle id when the source doesn't name one
pub const DEFAULT_VEHICLE_ID: &str = "vehicle-001";

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct IngestConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Worker pool / retry / shutdown settings
    #[serde(default)]
    #[validate(nested)]
    pub pipeline: PipelineSettings,

    /// Record source
    #[serde(default)]
    #[validate(nested)]
    pub source: SourceConfig,

    /// Broker transport
    #[serde(default)]
    #[validate(nested)]
    pub broker: BrokerConfig,
}

/// Ingestion mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Materialize the whole source, then dispatch
    Batch,
    /// Dispatch while the source is still producing
    #[default]
    Streaming,
}

impl std::fmt::Display for IngestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Batch => write!(f, "BATCH"),
            Self::Streaming => write!(f, "STREAMING"),
        }
    }
}

/// Worker pool and lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineSettings {
    /// Batch vs streaming
    #[serde(default)]
    pub mode: IngestMode,

    /// Concurrent workers
    #[serde(default = "default_worker_count", alias = "workerCount")]
    #[validate(range(min = 1, max = 1024))]
    pub worker_count: usize,

    /// Retry cap for transient errors
    #[serde(default = "default_max_retries", alias = "maxRetries")]
    #[validate(range(max = 32))]
    pub max_retries: u32,

    /// Initial retry delay (milliseconds)
    #[serde(default = "default_base_backoff_ms", alias = "baseBackoff")]
    pub base_backoff_ms: u64,

    /// Upper bound on the final flush (seconds)
    #[serde(default = "default_flush_timeout_secs", alias = "flushTimeout")]
    pub flush_timeout_secs: u64,

    /// Bounded work queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Delivery event channel capacity
    #[serde(default = "default_event_buffer")]
    #[validate(range(min = 1))]
    pub event_buffer: usize,
}

fn default_worker_count() -> usize {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    100
}

fn default_flush_timeout_secs() -> u64 {
    90
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_event_buffer() -> usize {
    10_000
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mode: IngestMode::default(),
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            flush_timeout_secs: default_flush_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl PipelineSettings {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

/// Record source configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// Detection CSV path
    #[serde(default)]
    pub csv_path: Option<PathBuf>,

    /// Vehicle that produced the detections
    #[serde(default = "default_vehicle_id")]
    #[validate(length(min = 1))]
    pub vehicle_id: String,

    /// Session id (generated when absent)
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_vehicle_id() -> String {
    DEFAULT_VEHICLE_ID.to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            vehicle_id: default_vehicle_id(),
            session_id: None,
        }
    }
}

/// Broker transport type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-process broker (tests, dry runs)
    #[default]
    Memory,
    /// Append-only JSON-lines log on disk
    File,
}

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BrokerConfig {
    /// Destination topic
    #[serde(default = "default_topic")]
    #[validate(length(min = 1))]
    pub topic: String,

    /// Transport implementation
    #[serde(default)]
    pub transport: TransportKind,

    /// Broker-side buffer (messages accepted but not yet acknowledged)
    #[serde(default = "default_buffer_capacity")]
    #[validate(range(min = 1))]
    pub buffer_capacity: usize,

    /// Largest accepted message (bytes)
    #[serde(default = "default_max_message_bytes")]
    #[validate(range(min = 64))]
    pub max_message_bytes: usize,

    /// Partition count used for key hashing
    #[serde(default = "default_partitions")]
    #[validate(range(min = 1, max = 4096))]
    pub partitions: u32,

    /// Log file path (file transport)
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Simulated ack latency (memory transport, milliseconds)
    #[serde(default)]
    pub ack_latency_ms: u64,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_buffer_capacity() -> usize {
    10_000
}

fn default_max_message_bytes() -> usize {
    1_000_000
}

fn default_partitions() -> u32 {
    6
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            transport: TransportKind::default(),
            buffer_capacity: default_buffer_capacity(),
            max_message_bytes: default_max_message_bytes(),
            partitions: default_partitions(),
            log_path: None,
            ack_latency_ms: 0,
        }
    }
}

impl BrokerConfig {
    pub fn ack_latency(&self) -> Duration {
        Duration::from_millis(self.ack_latency_ms)
    }
}
