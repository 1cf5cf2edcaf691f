//! External shutdown trigger

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cloneable shutdown trigger shared by the controller and its callers
///
/// Triggering stops the source and cancels the workers. The controller then
/// runs its normal flush and report sequence. Triggering more than once, or
/// after the run has already finished, has no further effect.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown; returns `true` only for the first request
    pub fn shutdown(&self, reason: &str) -> bool {
        if self.requested.swap(true, Ordering::AcqRel) {
            debug!(reason, "shutdown already requested");
            return false;
        }
        info!(reason, "shutdown requested");
        self.token.cancel();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Resolves once shutdown has been requested
    pub async fn requested(&self) {
        self.token.cancelled().await
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
