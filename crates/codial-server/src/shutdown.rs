//! Shutdown signalling for the HTTP layer.
//!
//! One [`ShutdownCoordinator`] per process: the HTTP server watches its
//! token for graceful-shutdown, and auxiliary background tasks are spawned
//! through it so [`drain`](ShutdownCoordinator::drain) can wait for them.
//! The turn workers are not tracked here; their drain-then-cancel sequence
//! lives with the worker pool in `codial-runtime`, and the binary runs the
//! two phases in order (stop accepting HTTP, then drain turns).

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Shutdown signal plus the set of tasks that must finish before exit.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// A clone of the shutdown token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a background task that [`drain`](Self::drain) will wait for.
    ///
    /// The task should watch [`token`](Self::token) and exit when it fires.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future)
    }

    /// Fire the shutdown signal. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the signal and wait up to `limit` for spawned tasks to finish.
    ///
    /// Returns `true` when everything exited in time; `false` means tasks
    /// were still running at the deadline (they keep running — the caller
    /// decides whether that blocks process exit).
    pub async fn drain(&self, limit: Duration) -> bool {
        self.shutdown();
        self.tracker.close();

        info!(tasks = self.tracker.len(), limit_secs = limit.as_secs(), "draining shutdown tasks");
        let clean = tokio::time::timeout(limit, self.tracker.wait()).await.is_ok();
        if clean {
            info!("shutdown tasks finished");
        } else {
            warn!(remaining = self.tracker.len(), "shutdown drain deadline expired");
        }
        clean
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
