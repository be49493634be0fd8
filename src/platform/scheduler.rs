//! Deferred task scheduling.
//!
//! All channel work happens in callbacks. Timers go through [`Scheduler`]
//! so that hosts (a tokio runtime, the simulator) decide how time passes.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// A deferred unit of work.
///
/// An `Err` return is an uncaught error: the scheduler reports it to the
/// host instead of handing it back to any caller.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send>;

// ============================================================================
// TimerHandle
// ============================================================================

/// Cancellation token for a scheduled task.
///
/// Clones share the same flag. Once cancelled, the task never runs.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Creates a live handle.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the task.
    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`TimerHandle::cancel`] was called.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs tasks after a delay on the host's event loop.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run once after `delay`.
    ///
    /// Implementations must skip the task if the returned handle was
    /// cancelled in the meantime.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_starts_live() {
        assert!(!TimerHandle::new().is_cancelled());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let handle = TimerHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
