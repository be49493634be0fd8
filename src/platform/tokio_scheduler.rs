//! [`Scheduler`] backed by a tokio runtime.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::error::{Error, Result};

use super::scheduler::{Scheduler, Task, TimerHandle};

// ============================================================================
// TokioScheduler
// ============================================================================

/// Spawns each task on a tokio runtime after `tokio::time::sleep`.
///
/// Uncaught task errors are logged and forwarded to the paired
/// [`UncaughtErrors`] receiver.
///
/// # Example
///
/// ```ignore
/// let (scheduler, mut uncaught) = TokioScheduler::current()?;
/// let platform = Platform::new(bus, frames, Arc::new(scheduler));
///
/// if let Some(err) = uncaught.recv().await {
///     eprintln!("fatal: {err}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    /// Runtime that owns the timers.
    runtime: Handle,
    /// Sink for uncaught task errors.
    uncaught: mpsc::UnboundedSender<Error>,
}

impl TokioScheduler {
    /// Creates a scheduler on the runtime of the calling task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Platform`] when called outside a tokio runtime.
    pub fn current() -> Result<(Self, UncaughtErrors)> {
        let runtime = Handle::try_current().map_err(|e| Error::platform(e.to_string()))?;
        Ok(Self::with_handle(runtime))
    }

    /// Creates a scheduler on a specific runtime.
    #[must_use]
    pub fn with_handle(runtime: Handle) -> (Self, UncaughtErrors) {
        let (uncaught, rx) = mpsc::unbounded_channel();
        (Self { runtime, uncaught }, UncaughtErrors { rx })
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let token = handle.clone();
        let uncaught = self.uncaught.clone();

        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            if token.is_cancelled() {
                trace!(?delay, "Skipping cancelled task");
                return;
            }

            if let Err(err) = task() {
                error!(error = %err, "Uncaught error in scheduled task");
                if let Err(mpsc::error::SendError(err)) = uncaught.send(err) {
                    trace!(error = %err, "Uncaught error receiver dropped");
                }
            }
        });

        handle
    }
}

// ============================================================================
// UncaughtErrors
// ============================================================================

/// Receives errors returned by scheduled tasks.
#[derive(Debug)]
pub struct UncaughtErrors {
    rx: mpsc::UnboundedReceiver<Error>,
}

impl UncaughtErrors {
    /// Waits for the next uncaught error.
    ///
    /// Returns `None` once every scheduler clone has been dropped.
    pub async fn recv(&mut self) -> Option<Error> {
        self.rx.recv().await
    }

    /// Returns an uncaught error if one is already queued.
    pub fn try_recv(&mut self) -> Option<Error> {
        self.rx.try_recv().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{Instant, sleep};

    #[test]
    fn test_current_outside_runtime_fails() {
        let err = TokioScheduler::current().unwrap_err();
        assert!(matches!(err, Error::Platform { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        let (scheduler, _uncaught) = TokioScheduler::current().unwrap();
        let ran_at = Arc::new(parking_lot::Mutex::new(None));
        let start = Instant::now();

        let slot = Arc::clone(&ran_at);
        scheduler.schedule(
            Duration::from_millis(50),
            Box::new(move || {
                *slot.lock() = Some(Instant::now());
                Ok(())
            }),
        );

        sleep(Duration::from_millis(100)).await;

        let ran_at = (*ran_at.lock()).expect("task did not run");
        assert!(ran_at - start >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_is_skipped() {
        let (scheduler, _uncaught) = TokioScheduler::current().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let handle = scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        handle.cancel();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncaught_errors_are_forwarded() {
        let (scheduler, mut uncaught) = TokioScheduler::current().unwrap();

        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(|| Err(Error::handshake_timeout(5))),
        );

        let err = uncaught.recv().await.unwrap();
        assert!(err.is_handshake_timeout());
        assert!(uncaught.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_without_receiver_do_not_stop_scheduler() {
        let (scheduler, uncaught) = TokioScheduler::current().unwrap();
        drop(uncaught);
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(|| Err(Error::handshake_timeout(5))),
        );
        let counter = Arc::clone(&runs);
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
