//! Host platform seam.
//!
//! A [`Channel`](crate::Channel) never talks to a browser directly. It
//! consumes three collaborators bundled in a [`Platform`]:
//!
//! | Collaborator | Role |
//! |--------------|------|
//! | [`MessageBus`] | Delivers every inbound message to registered listeners |
//! | [`FrameProvisioner`] | Creates a hidden child frame and reports its endpoint on load |
//! | [`Scheduler`] | Runs deferred tasks (timeouts, retry ticks) |
//!
//! Remote windows are reached through [`Endpoint`] handles.
//!
//! # Implementations
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TokioScheduler`] | Timers on a tokio runtime |
//! | [`crate::sim`] | Deterministic in-memory windows, frames and clock |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

// ============================================================================
// Submodules
// ============================================================================

/// Endpoint, message bus and frame provisioner traits.
pub mod endpoint;

/// Scheduler trait and cancellation handles.
pub mod scheduler;

/// Tokio-backed scheduler.
pub mod tokio_scheduler;

// ============================================================================
// Re-exports
// ============================================================================

pub use endpoint::{
    Endpoint, FrameProvisioner, InboundMessage, LoadCallback, MessageBus, MessageListener,
    MessageTarget,
};
pub use scheduler::{Scheduler, Task, TimerHandle};
pub use tokio_scheduler::{TokioScheduler, UncaughtErrors};

// ============================================================================
// Platform
// ============================================================================

/// Collaborators a channel needs from its host.
#[derive(Clone)]
pub struct Platform {
    /// Inbound message delivery.
    bus: Arc<dyn MessageBus>,
    /// Child frame creation.
    frames: Arc<dyn FrameProvisioner>,
    /// Deferred task execution.
    scheduler: Arc<dyn Scheduler>,
}

impl Platform {
    /// Bundles the host collaborators.
    #[inline]
    #[must_use]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        frames: Arc<dyn FrameProvisioner>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            bus,
            frames,
            scheduler,
        }
    }

    /// Replaces the scheduler, keeping bus and frames.
    #[inline]
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Returns the message bus.
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Returns the frame provisioner.
    #[inline]
    #[must_use]
    pub fn frames(&self) -> &Arc<dyn FrameProvisioner> {
        &self.frames
    }

    /// Returns the scheduler.
    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
