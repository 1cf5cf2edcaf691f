//! Pipeline error types
//!
//! Only run-level failures surface here. Per-record delivery failures are
//! counted in the report instead.

use broker::BrokerError;
use dispatcher::DispatcherError;
use ingestion::IngestionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or incomplete configuration
    #[error("pipeline configuration error: {message}")]
    Config { message: String },

    /// The record source could not be opened or loaded
    #[error(transparent)]
    Source(#[from] IngestionError),

    /// The broker transport could not be built
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Worker pool or collector failure
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    /// A pipeline task panicked
    #[error("pipeline task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
