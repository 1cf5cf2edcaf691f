//! Layered error definitions
//!
//! Categorized by source: config / record / delivery

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Record Errors =====
    /// Record could not be encoded into / decoded from a message body
    #[error("serialization error for '{key}': {message}")]
    Serialization { key: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create serialization error
    pub fn serialization(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Whether an error is worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Buffer full, temporary disconnect: retry with backoff
    Transient,
    /// Oversized or malformed message, closed client: never retry
    Permanent,
}

/// Delivery error, reported either synchronously by `send` or asynchronously
/// through a delivery event.
///
/// The transient/permanent split is part of the type; callers use
/// [`DeliveryError::is_retriable`] instead of inspecting messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    // ===== Transient =====
    /// Broker-side local buffer is full
    #[error("broker buffer full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Temporary transport failure
    #[error("transient transport failure: {message}")]
    Transport { message: String },

    // ===== Permanent =====
    /// Message exceeds the broker's size limit
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Message rejected as malformed
    #[error("invalid message: {message}")]
    InvalidMessage { message: String },

    /// Broker refused the message
    #[error("broker rejected message: {message}")]
    Rejected { message: String },

    /// Delivery client or transport already closed
    #[error("delivery client closed")]
    Closed,

    /// Transport dropped the message without reporting an outcome
    #[error("delivery report dropped before completion")]
    ReportDropped,
}

impl DeliveryError {
    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::QueueFull { .. } | Self::Transport { .. } => ErrorClass::Transient,
            Self::MessageTooLarge { .. }
            | Self::InvalidMessage { .. }
            | Self::Rejected { .. }
            | Self::Closed
            | Self::ReportDropped => ErrorClass::Permanent,
        }
    }

    /// Whether retrying may succeed
    pub fn is_retriable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueueFull { .. } => "queue_full",
            Self::Transport { .. } => "transport",
            Self::MessageTooLarge { .. } => "message_too_large",
            Self::InvalidMessage { .. } => "invalid_message",
            Self::Rejected { .. } => "rejected",
            Self::Closed => "closed",
            Self::ReportDropped => "report_dropped",
        }
    }

    /// Create transient transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create invalid message error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Create broker rejection error
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}
