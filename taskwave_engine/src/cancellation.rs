//! Cooperative cancellation for workflow executions.
//!
//! Each workflow execution owns one [`CancellationSource`]; every step
//! runner holds a clone of its [`CancellationToken`]. Pause and cancel
//! both fire the source, and runners observe the token before sleeping
//! or retrying and while racing the executor call, so an in-flight step
//! resolves to an aborted failure instead of blocking the orchestrator.
//!
//! Cancellation is cooperative, not preemptive: firing the token never
//! interrupts an executor call that is already running, it only lets
//! the orchestrator stop waiting for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Thread-safe cancellation token.
///
/// Cheap to clone; all clones share the same cancellation state. Tasks
/// either poll [`is_cancelled`](Self::is_cancelled) or await
/// [`wait_cancelled`](Self::wait_cancelled) inside a `tokio::select!`.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Returns true once the owning source has fired.
    ///
    /// SeqCst so cancellation is visible across all threads immediately.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves when the token is cancelled; immediately if it already is.
    pub async fn wait_cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            // Re-check between registering and awaiting so a cancel
            // landing in that window is not missed
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    fn fire(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// Owner of a cancellation scope.
///
/// Created per workflow execution; [`cancel`](Self::cancel) fires every
/// token cloned from [`token`](Self::token).
#[derive(Debug)]
pub struct CancellationSource {
    token: CancellationToken,
}

impl CancellationSource {
    /// Creates a fresh, unfired scope.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns a token observing this scope.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fires the scope. Idempotent.
    pub fn cancel(&self) {
        self.token.fire();
    }

    /// Returns true once fired.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}
