//! Envelopes and reserved handshake events.
//!
//! An [`Envelope`] is one named application event plus its payload. It is
//! built per emit and per inbound message and consumed right after
//! encoding or dispatch.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Field that carries the event name inside the encoded object.
pub const EVENT_FIELD: &str = "event";

// ============================================================================
// Types
// ============================================================================

/// Application payload: string keys to JSON values.
pub type Payload = Map<String, Value>;

// ============================================================================
// ReservedEvent
// ============================================================================

/// Event names owned by the handshake.
///
/// Applications can neither emit nor register these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedEvent {
    /// Liveness check sent by the side that provisioned the frame.
    Ping,
    /// Reply to [`ReservedEvent::Ping`].
    Pong,
}

impl ReservedEvent {
    /// All reserved events.
    pub const ALL: [Self; 2] = [Self::Ping, Self::Pong];

    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Looks up a reserved event by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }

    /// Returns `true` if `name` belongs to the handshake.
    #[inline]
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        Self::from_name(name).is_some()
    }
}

impl fmt::Display for ReservedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A named event with its payload.
///
/// The payload never contains [`EVENT_FIELD`]; that key is reserved for
/// routing and is added only on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Event name.
    event: String,
    /// Application fields.
    payload: Payload,
}

impl Envelope {
    /// Creates an envelope.
    ///
    /// # Errors
    ///
    /// - [`Error::ReservedField`] if `payload` defines [`EVENT_FIELD`]
    pub fn new(event: impl Into<String>, payload: Payload) -> Result<Self> {
        if payload.contains_key(EVENT_FIELD) {
            return Err(Error::reserved_field(EVENT_FIELD));
        }

        Ok(Self {
            event: event.into(),
            payload,
        })
    }

    /// Creates an envelope with an empty payload.
    #[inline]
    #[must_use]
    pub fn empty(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            payload: Payload::new(),
        }
    }

    /// Creates an envelope from any value that serializes to a JSON object.
    ///
    /// `null` (including `()` and `None`) becomes an empty payload.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::InvalidPayload`] if the value is not an object
    /// - [`Error::ReservedField`] if the object defines [`EVENT_FIELD`]
    pub fn from_value<T: Serialize + ?Sized>(event: impl Into<String>, value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(payload) => Self::new(event, payload),
            Value::Null => Ok(Self::empty(event)),
            other => Err(Error::invalid_payload(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Creates the envelope for a handshake event.
    #[inline]
    pub(crate) fn handshake(event: ReservedEvent) -> Self {
        Self::empty(event.as_str())
    }

    /// Returns the event name.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the reserved event this envelope carries, if any.
    #[inline]
    #[must_use]
    pub fn reserved(&self) -> Option<ReservedEvent> {
        ReservedEvent::from_name(&self.event)
    }

    /// Splits the envelope into event name and payload.
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> (String, Payload) {
        (self.event, self.payload)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Tests
// ============================================================================
