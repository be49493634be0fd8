//! Event routing.
//!
//! Keeps one handler per event name, dispatches decoded inbound envelopes,
//! and holds emits issued before the remote endpoint is known.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::Result;
use crate::protocol::{Envelope, Payload, WireCodec};
use crate::transport::TransportBinding;

// ============================================================================
// Types
// ============================================================================

/// Application callback for one event name.
///
/// Receives the payload without the routing field.
pub type Handler = Arc<dyn Fn(Payload) + Send + Sync>;

/// Result of an emit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Encoded and handed to the transport.
    Sent,
    /// Queued until the remote endpoint is known.
    Queued,
    /// Discarded because the handshake already failed.
    Dropped,
}

// ============================================================================
// EventRouter
// ============================================================================

/// Handler table plus pending-emit queue.
///
/// Handlers are cloned out of the table before they run, so a handler may
/// register, remove or emit without deadlocking.
pub struct EventRouter {
    /// Event name to handler, last registration wins.
    handlers: RwLock<FxHashMap<String, Handler>>,
    /// Emits waiting for the endpoint, in call order.
    pending: Mutex<VecDeque<Envelope>>,
    /// Wire codec.
    codec: Arc<dyn WireCodec>,
}

impl EventRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new(codec: Arc<dyn WireCodec>) -> Self {
        Self {
            handlers: RwLock::new(FxHashMap::default()),
            pending: Mutex::new(VecDeque::new()),
            codec,
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Registers `handler` for `event`, returning the handler it replaced.
    pub fn register(&self, event: impl Into<String>, handler: Handler) -> Option<Handler> {
        self.handlers.write().insert(event.into(), handler)
    }

    /// Removes the handler for `event`. Returns `true` if one existed.
    pub fn unregister(&self, event: &str) -> bool {
        self.handlers.write().remove(event).is_some()
    }

    /// Returns `true` if a handler is registered for `event`.
    #[must_use]
    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.read().contains_key(event)
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Decodes a raw inbound string. Malformed input yields `None`.
    pub fn decode(&self, raw: &str) -> Option<Envelope> {
        match self.codec.decode(raw) {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                trace!(error = %err, "Dropping malformed message");
                None
            }
        }
    }

    /// Invokes the handler for the envelope's event.
    ///
    /// Returns `false` if no handler is registered; the envelope is dropped.
    pub fn dispatch(&self, envelope: Envelope) -> bool {
        let handler = self.handlers.read().get(envelope.event()).cloned();

        match handler {
            Some(handler) => {
                let (_, payload) = envelope.into_parts();
                handler(payload);
                true
            }
            None => {
                trace!(event = envelope.event(), "No handler registered");
                false
            }
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Sends now if the transport is ready, otherwise queues.
    ///
    /// After a failed handshake with no endpoint the envelope is dropped.
    ///
    /// # Errors
    ///
    /// Returns encoding or platform errors from an immediate send.
    pub fn emit(
        &self,
        transport: &TransportBinding,
        envelope: Envelope,
        failed: bool,
    ) -> Result<EmitOutcome> {
        if transport.is_ready() {
            self.send(transport, &envelope)?;
            return Ok(EmitOutcome::Sent);
        }

        if failed {
            trace!(event = envelope.event(), "Dropping emit after handshake failure");
            return Ok(EmitOutcome::Dropped);
        }

        self.pending.lock().push_back(envelope);
        Ok(EmitOutcome::Queued)
    }

    /// Encodes and sends, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Returns encoding errors, [`Error::NotReady`](crate::Error::NotReady),
    /// or platform errors.
    pub fn send(&self, transport: &TransportBinding, envelope: &Envelope) -> Result<()> {
        let raw = self.codec.encode(envelope)?;
        transport.send(&raw)
    }

    /// Sends every queued emit in call order.
    ///
    /// Returns the number of emits sent. Does nothing while the transport is
    /// not ready.
    pub fn drain(&self, transport: &TransportBinding) -> usize {
        if !transport.is_ready() {
            return 0;
        }

        let queued = mem::take(&mut *self.pending.lock());
        let mut sent = 0;

        for envelope in queued {
            match self.send(transport, &envelope) {
                Ok(()) => sent += 1,
                Err(err) => {
                    warn!(event = envelope.event(), error = %err, "Failed to send queued emit");
                }
            }
        }

        sent
    }

    /// Discards every queued emit, returning how many were dropped.
    pub fn drop_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    /// Returns the number of queued emits.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("handlers", &self.handlers.read().len())
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
