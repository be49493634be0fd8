//! Crosswindow - event channels between browsing contexts.
//!
//! This library multiplexes named events over a postMessage-style primitive
//! that only carries opaque strings between two windows or frames.
//!
//! # Architecture
//!
//! A channel is one side of the link:
//!
//! - **Active side**: provisions the remote frame, pings it once loaded
//! - **Passive side**: learns its peer from the first inbound message,
//!   answers with a pong
//!
//! Key design principles:
//!
//! - The host is reached only through traits in [`platform`]
//! - One flat JSON object per message, event name under `"event"`
//! - Emits before the peer is known are queued, then flushed in order
//! - The handshake either connects or fails after the connection timeout
//!
//! # Quick Start
//!
//! ```no_run
//! use crosswindow::sim::SimWorld;
//! use crosswindow::{Channel, ChannelOptions, Result};
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let world = SimWorld::new();
//!     let host = world.open_window("https://b.example/host.html")?;
//!
//!     let channel = Channel::builder()
//!         .source("B.html")
//!         .origin("https://b.example")
//!         .build(host.platform())?;
//!
//!     channel.on("greet", |payload| println!("got {payload:?}"))?;
//!     channel.emit_value("greet", &json!({ "msg": "hi" }))?;
//!
//!     world.run_until_idle();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channel`] | [`Channel`], [`ChannelBuilder`], [`ChannelOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`platform`] | Host traits and the tokio scheduler |
//! | [`protocol`] | Envelopes and the wire codec |
//! | [`sim`] | Deterministic in-memory platform |
//! | [`transport`] | Remote endpoint binding |

// ============================================================================
// Modules
// ============================================================================

/// Channel facade, configuration, handshake, and routing.
pub mod channel;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Host services consumed by a channel.
///
/// Message bus, frame provisioner, scheduler, and endpoint references.
pub mod platform;

/// Wire protocol: envelopes, reserved events, codec.
pub mod protocol;

/// Deterministic simulation of windows, frames, and timers.
pub mod sim;

/// Remote endpoint binding.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channel::{
    Channel, ChannelBuilder, ChannelOptions, ConnectionState, FailureCallback, Handler,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ChannelId, EndpointId, ListenerId};

// Platform types
pub use platform::{
    Endpoint, FrameProvisioner, InboundMessage, MessageBus, MessageTarget, Platform, Scheduler,
    TimerHandle, TokioScheduler, UncaughtErrors,
};

// Protocol types
pub use protocol::{Envelope, JsonCodec, Payload, ReservedEvent, WireCodec};
