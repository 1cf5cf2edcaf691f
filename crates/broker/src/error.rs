//! Broker error types

use std::path::PathBuf;

use contracts::{DeliveryError, Message};
use thiserror::Error;

/// Transport construction errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Log file could not be opened
    #[error("failed to open broker log {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration cannot produce a transport
    #[error("invalid broker configuration: {message}")]
    Config { message: String },
}

impl BrokerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Synchronous send rejection, handing the message back for retry
#[derive(Debug, Error)]
#[error("send of '{}' rejected: {}", .message.key, .error)]
pub struct SendError {
    pub error: DeliveryError,
    pub message: Message,
}

impl SendError {
    pub fn is_retriable(&self) -> bool {
        self.error.is_retriable()
    }

    pub fn into_parts(self) -> (DeliveryError, Message) {
        (self.error, self.message)
    }
}
