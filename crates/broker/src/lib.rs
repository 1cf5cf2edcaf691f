//! # Broker
//!
//! Delivery Client and broker transports.
//!
//! ## Delivery contract
//! - `DeliveryClient::send` either buffers a message or hands it back with a
//!   classified `DeliveryError`
//! - every buffered message produces exactly one `DeliveryEvent`
//! - `flush(timeout)` reports how many messages are still outstanding
//!
//! ## Transports
//! - `MemoryBroker`: in-process, scriptable faults (tests, dry runs)
//! - `FileLogBroker`: append-only JSON-lines log

mod client;
mod error;
mod factory;
mod file;
mod memory;
mod transport;

pub use client::DeliveryClient;
pub use error::{BrokerError, SendError};
pub use factory::{build_transport, memory_config};
pub use file::{FileLogBroker, FileLogConfig, LogLine};
pub use memory::{partition_for, DeliveredMessage, FaultPlan, MemoryBroker, MemoryBrokerConfig};
pub use transport::{BrokerTransport, DeliveryEvents, DeliveryReporter, SubmitError};
