//! Wire protocol.
//!
//! # Message Format
//!
//! Every message is one JSON object string. The event name sits next to the
//! application fields:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `event` | Event name (routing only, stripped before delivery) |
//! | anything else | Application payload |
//!
//! # Reserved Events
//!
//! | Event | Direction | Purpose |
//! |-------|-----------|---------|
//! | `ping` | Frame owner → frame | Liveness check, reply-path discovery |
//! | `pong` | Frame → frame owner | Handshake reply |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | [`WireCodec`] trait and [`JsonCodec`] |
//! | `envelope` | [`Envelope`], [`Payload`], [`ReservedEvent`] |

// ============================================================================
// Submodules
// ============================================================================

/// Wire codec trait and JSON implementation.
pub mod codec;

/// Envelope and reserved event types.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{JsonCodec, WireCodec};
pub use envelope::{EVENT_FIELD, Envelope, Payload, ReservedEvent};
