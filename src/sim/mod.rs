//! Deterministic in-memory platform.
//!
//! Implements every platform trait on a virtual clock so channels can be
//! exercised without a browser or a runtime. Used by the crate's tests, the
//! benchmarks, and the demo.
//!
//! | Type | Role |
//! |------|------|
//! | [`SimWorld`] | Clock, task queue, page registry, uncaught errors |
//! | [`SimWindow`] | Message bus, frame provisioner, and scheduler of one window |
//!
//! Message delivery follows postMessage rules: always asynchronous, FIFO,
//! filtered by target origin (`*`, `/` for same-origin, or an exact
//! origin). Filtered messages vanish without an error.

// ============================================================================
// Submodules
// ============================================================================

/// Simulated windows and endpoints.
pub mod window;

/// Virtual clock and task queue.
pub mod world;

// ============================================================================
// Re-exports
// ============================================================================

pub use window::SimWindow;
pub use world::{DEFAULT_LOAD_LATENCY, PageScript, SimWorld};
