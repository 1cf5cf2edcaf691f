//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A worker task panicked or was aborted
    #[error("worker {worker_id} terminated abnormally: {message}")]
    WorkerFailed { worker_id: usize, message: String },

    /// The collector task panicked or was aborted
    #[error("delivery report collector terminated abnormally: {message}")]
    CollectorFailed { message: String },

    /// Pool configured without workers
    #[error("worker pool needs at least one worker")]
    NoWorkers,
}

impl DispatcherError {
    pub fn worker_failed(worker_id: usize, message: impl Into<String>) -> Self {
        Self::WorkerFailed {
            worker_id,
            message: message.into(),
        }
    }
}
