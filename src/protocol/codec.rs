//! Wire codec.
//!
//! The transport only carries strings, so each envelope becomes one flat
//! JSON object with the event name stored under [`EVENT_FIELD`]:
//!
//! ```json
//! { "event": "greet", "msg": "hi" }
//! ```
//!
//! The event name lives in the same object as the payload rather than in a
//! prefix, so a platform that wraps the string again never sees nested
//! encodings.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::envelope::{EVENT_FIELD, Envelope, Payload};

// ============================================================================
// WireCodec
// ============================================================================

/// Converts envelopes to and from transport strings.
///
/// `decode(encode(e)) == e` must hold for every envelope.
pub trait WireCodec: Send + Sync {
    /// Encodes an envelope into a single string.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be represented.
    fn encode(&self, envelope: &Envelope) -> Result<String>;

    /// Decodes a transport string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] if `raw` is not a valid encoding.
    fn decode(&self, raw: &str) -> Result<Envelope>;
}

// ============================================================================
// JsonCodec
// ============================================================================

/// Default codec: flat JSON objects via `serde_json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

/// Borrowed wire shape for encoding.
#[derive(Serialize)]
struct WireRef<'a> {
    event: &'a str,
    #[serde(flatten)]
    payload: &'a Payload,
}

/// Owned wire shape for decoding.
#[derive(Deserialize)]
struct WireOwned {
    event: String,
    #[serde(flatten)]
    payload: Payload,
}

impl WireCodec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<String> {
        if envelope.payload().contains_key(EVENT_FIELD) {
            return Err(Error::reserved_field(EVENT_FIELD));
        }

        let wire = WireRef {
            event: envelope.event(),
            payload: envelope.payload(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    fn decode(&self, raw: &str) -> Result<Envelope> {
        let wire: WireOwned =
            serde_json::from_str(raw).map_err(|e| Error::malformed(e.to_string()))?;
        Envelope::new(wire.event, wire.payload)
    }
}

// ============================================================================
// Tests
// ============================================================================
