//! Channel between two browsing contexts.
//!
//! A [`Channel`] is one side of the link. The active side provisions the
//! remote frame and pings it once loaded; the passive side learns its peer
//! from the first inbound message and answers with a pong.
//!
//! # Handshake
//!
//! ```text
//!   A (active)                         B (passive)
//!   ──────────                         ───────────
//!   create_frame(source) ──────────►   page loads, B created
//!   frame load: attach B
//!   send ping ─────────────────────►   attach A, connected
//!              ◄─────────────────────  send pong
//!   connected
//! ```
//!
//! Emits issued before the peer is known are queued and flushed, in call
//! order, the moment the peer becomes known.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ChannelBuilder`] |
//! | `core` | [`Channel`] facade |
//! | `handshake` | [`ConnectionState`] and the ping/pong state machine |
//! | `options` | [`ChannelOptions`] |
//! | `router` | Handler table and pending-emit queue |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent channel configuration.
pub mod builder;

/// Channel facade.
pub mod core;

/// Handshake state machine.
pub mod handshake;

/// Channel options.
pub mod options;

/// Event routing and pending emits.
pub mod router;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ChannelBuilder, FailureCallback};
pub use core::Channel;
pub use handshake::{ConnectionState, Handshake, HandshakeStep};
pub use options::{ANY_ORIGIN, ChannelOptions, DEFAULT_CONNECTION_TIMEOUT, SAME_ORIGIN};
pub use router::{EmitOutcome, EventRouter, Handler};
