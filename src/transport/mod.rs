//! Transport layer.
//!
//! Wraps the platform's postMessage-style primitive into a two-call
//! surface: send a raw string to the remote window, and accept raw strings
//! from anywhere.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Channel (A)    │      post_message(data,      │  Channel (B)    │
//! │                 │        target_origin)        │                 │
//! │  Transport-     │─────────────────────────────►│  MessageBus     │
//! │  Binding        │◄─────────────────────────────│  listener       │
//! │                 │   InboundMessage{data,       │                 │
//! └─────────────────┘     origin, source}          └─────────────────┘
//! ```
//!
//! # Binding Lifecycle
//!
//! 1. Unbound: sends fail with `NotReady`
//! 2. Active side: frame load attaches the frame's endpoint
//! 3. Passive side: the first inbound message attaches its sender
//! 4. Bound: the endpoint never changes again

// ============================================================================
// Submodules
// ============================================================================

/// Endpoint binding and raw send/receive.
pub mod binding;

// ============================================================================
// Re-exports
// ============================================================================

pub use binding::{Received, TransportBinding};
