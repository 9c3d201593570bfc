//! Per-request background operations
//!
//! Cache writes, access-timestamp bumps, background refetches and provider
//! calls that outlived their time budget are all spawned here instead of
//! being awaited on the response path. The request boundary must either
//! [`PendingOps::drain`] the set or [`PendingOps::hand_off`] it to the
//! process-wide tracker, so deferred writes are never silently dropped.

use std::fmt::Display;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn, Instrument};

/// Tracked completion set for one request
#[derive(Clone, Default)]
pub struct PendingOps {
    tracker: TaskTracker,
}

impl PendingOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked task, returning its handle
    ///
    /// Dropping the handle detaches the task; it keeps running and is still
    /// awaited by [`PendingOps::drain`].
    pub fn spawn<F>(&self, label: &'static str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        debug!(operation = label, "Spawning background operation");
        self.tracker
            .spawn(future.instrument(tracing::debug_span!("pending", operation = label)))
    }

    /// Spawn a fire-and-forget fallible task; failures are logged and dropped
    pub fn spawn_logged<F, E>(&self, label: &'static str, future: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.spawn(label, async move {
            if let Err(e) = future.await {
                warn!(operation = label, error = %e, "Background operation failed");
            }
        });
    }

    /// Number of operations still running
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait until every operation spawned so far (and any they spawn) completes
    pub async fn drain(self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Move the wait onto a longer-lived tracker (process shutdown waits on it)
    pub fn hand_off(self, owner: &TaskTracker) {
        if self.tracker.is_empty() {
            return;
        }
        let pending = self.tracker.len();
        debug!(pending, "Handing off background operations");
        owner.spawn(self.drain());
    }
}
