//! Transport construction from configuration

use std::sync::Arc;

use contracts::{BrokerConfig, TransportKind};
use tracing::{info, instrument};

use crate::error::BrokerError;
use crate::file::{FileLogBroker, FileLogConfig};
use crate::memory::{FaultPlan, MemoryBroker, MemoryBrokerConfig};
use crate::transport::BrokerTransport;

/// Build the configured transport
///
/// Must be called inside a tokio runtime (transports own a background task).
#[instrument(name = "broker_build_transport", skip(config), fields(transport = ?config.transport))]
pub fn build_transport(config: &BrokerConfig) -> Result<Arc<dyn BrokerTransport>, BrokerError> {
    let transport: Arc<dyn BrokerTransport> = match config.transport {
        TransportKind::Memory => MemoryBroker::start(memory_config(config, FaultPlan::default())),
        TransportKind::File => {
            let path = config
                .log_path
                .clone()
                .ok_or_else(|| BrokerError::config("file transport requires log_path"))?;
            Arc::new(FileLogBroker::open(FileLogConfig {
                path,
                partitions: config.partitions,
                buffer_capacity: config.buffer_capacity,
                max_message_bytes: config.max_message_bytes,
            })?)
        }
    };

    info!(
        transport = transport.name(),
        topic = %config.topic,
        partitions = config.partitions,
        "broker transport ready"
    );
    Ok(transport)
}

/// Memory broker settings derived from the broker section
pub fn memory_config(config: &BrokerConfig, faults: FaultPlan) -> MemoryBrokerConfig {
    MemoryBrokerConfig {
        buffer_capacity: config.buffer_capacity,
        partitions: config.partitions,
        max_message_bytes: config.max_message_bytes,
        ack_latency: config.ack_latency(),
        faults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_memory_transport() {
        let transport = build_transport(&BrokerConfig::default()).unwrap();
        assert_eq!(transport.name(), "memory");
    }

    #[tokio::test]
    async fn test_file_transport_requires_path() {
        let config = BrokerConfig {
            transport: TransportKind::File,
            ..Default::default()
        };
        let err = build_transport(&config).err().unwrap();
        assert!(matches!(err, BrokerError::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_file_transport() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrokerConfig {
            transport: TransportKind::File,
            log_path: Some(dir.path().join("out.jsonl")),
            ..Default::default()
        };
        let transport = build_transport(&config).unwrap();
        assert_eq!(transport.name(), "file");
    }
}
