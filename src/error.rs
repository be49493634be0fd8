//! Error types for crosswindow.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use crosswindow::{Channel, Result};
//!
//! fn greet(channel: &Channel) -> Result<()> {
//!     channel.emit_value("greet", &serde_json::json!({ "msg": "hi" }))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Surfaced? |
//! |----------|----------|-----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidOrigin`] | At construction |
//! | Misuse | [`Error::ReservedEvent`], [`Error::ReservedField`], [`Error::InvalidPayload`] | At call site |
//! | Per-message | [`Error::MalformedMessage`], [`Error::NotReady`] | Never, absorbed |
//! | Handshake | [`Error::HandshakeTimeout`] | Failure callback or uncaught |
//! | Platform | [`Error::Platform`], [`Error::StateClosed`] | At call site |
//! | External | [`Error::Json`], [`Error::Url`] | At call site |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::watch::error::RecvError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when channel options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Target origin is neither `*`, `/`, nor a serialized origin.
    #[error("Invalid target origin: {origin}")]
    InvalidOrigin {
        /// The rejected origin string.
        origin: String,
    },

    // ========================================================================
    // Misuse Errors
    // ========================================================================
    /// Application tried to emit or register a handshake event.
    #[error("Event name is reserved: {event}")]
    ReservedEvent {
        /// The reserved event name.
        event: String,
    },

    /// Payload defines the field that carries the event name on the wire.
    #[error("Payload must not define reserved field: {field}")]
    ReservedField {
        /// The reserved field name.
        field: String,
    },

    /// Value could not be turned into a payload object.
    #[error("Invalid payload: {message}")]
    InvalidPayload {
        /// Description of the payload problem.
        message: String,
    },

    // ========================================================================
    // Per-message Errors
    // ========================================================================
    /// Inbound data is not a valid encoded envelope.
    ///
    /// Never surfaced to the application; the message is dropped.
    #[error("Malformed message: {message}")]
    MalformedMessage {
        /// Description of the decode failure.
        message: String,
    },

    /// No remote endpoint is known yet.
    ///
    /// Internal signal for the emit path.
    #[error("Remote endpoint not ready")]
    NotReady,

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// The remote endpoint never answered the handshake.
    #[error("Unable to connect to remote endpoint within {timeout_ms}ms")]
    HandshakeTimeout {
        /// Configured connection timeout in milliseconds.
        timeout_ms: u64,
    },

    // ========================================================================
    // Platform Errors
    // ========================================================================
    /// The host platform refused an operation.
    #[error("Platform error: {message}")]
    Platform {
        /// Description of the platform error.
        message: String,
    },

    /// Connection-state publisher went away.
    #[error("Connection state closed")]
    StateClosed(#[from] RecvError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid origin error.
    #[inline]
    pub fn invalid_origin(origin: impl Into<String>) -> Self {
        Self::InvalidOrigin {
            origin: origin.into(),
        }
    }

    /// Creates a reserved event error.
    #[inline]
    pub fn reserved_event(event: impl Into<String>) -> Self {
        Self::ReservedEvent {
            event: event.into(),
        }
    }

    /// Creates a reserved field error.
    #[inline]
    pub fn reserved_field(field: impl Into<String>) -> Self {
        Self::ReservedField {
            field: field.into(),
        }
    }

    /// Creates an invalid payload error.
    #[inline]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Creates a malformed message error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates a platform error.
    #[inline]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is the terminal handshake failure.
    #[inline]
    #[must_use]
    pub fn is_handshake_timeout(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. })
    }

    /// Returns `true` if the caller used the API incorrectly.
    #[inline]
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidOrigin { .. }
                | Self::ReservedEvent { .. }
                | Self::ReservedField { .. }
                | Self::InvalidPayload { .. }
        )
    }

    /// Returns `true` if the channel swallows this error instead of
    /// reporting it.
    #[inline]
    #[must_use]
    pub fn is_absorbed(&self) -> bool {
        matches!(self, Self::MalformedMessage { .. } | Self::NotReady)
    }
}

// ============================================================================
// Tests
// ============================================================================
