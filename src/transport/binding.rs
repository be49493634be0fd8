//! Binding to the remote window.
//!
//! Owns the one piece of state shared by every channel component: the
//! remote endpoint reference. It is written at most once, either when an
//! actively created frame finishes loading or when the first inbound message
//! reveals its sender, and never cleared afterwards.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::error::{Error, Result};
use crate::platform::{Endpoint, InboundMessage};

// ============================================================================
// Received
// ============================================================================

/// Raw inbound data forwarded by the binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Raw payload string.
    pub raw: String,
    /// Sender origin as reported by the platform.
    pub origin: String,
    /// `true` if this message's sender just became the remote endpoint.
    pub newly_bound: bool,
}

// ============================================================================
// TransportBinding
// ============================================================================

/// Send/receive surface over the platform's message primitive.
pub struct TransportBinding {
    /// Remote endpoint, set once.
    endpoint: OnceLock<Endpoint>,
    /// Target-origin filter passed on every send.
    target_origin: String,
}

impl TransportBinding {
    /// Creates an unbound transport.
    #[inline]
    #[must_use]
    pub fn new(target_origin: impl Into<String>) -> Self {
        Self {
            endpoint: OnceLock::new(),
            target_origin: target_origin.into(),
        }
    }

    /// Returns `true` once a remote endpoint is known.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.endpoint.get().is_some()
    }

    /// Returns the remote endpoint, if known.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.get()
    }

    /// Returns the target-origin filter.
    #[inline]
    #[must_use]
    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }

    /// Sends a raw string to the remote endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if no endpoint is known yet
    /// - Whatever the platform returns from `post_message`
    pub fn send(&self, raw: &str) -> Result<()> {
        let endpoint = self.endpoint.get().ok_or(Error::NotReady)?;
        trace!(endpoint = %endpoint.id(), bytes = raw.len(), "Posting message");
        endpoint.post_message(raw, &self.target_origin)
    }

    /// Records `endpoint` as the remote endpoint unless one is already set.
    ///
    /// Returns `true` if this call set it.
    pub fn attach(&self, endpoint: Endpoint) -> bool {
        self.endpoint.set(endpoint).is_ok()
    }

    /// Accepts one inbound platform message.
    ///
    /// Messages without a sender handle are ignored. Otherwise the sender
    /// is recorded if no endpoint is known yet, and the raw data is always
    /// forwarded.
    pub fn receive(&self, message: InboundMessage) -> Option<Received> {
        let Some(source) = message.source else {
            trace!(origin = %message.origin, "Ignoring message without source");
            return None;
        };

        let newly_bound = !self.is_ready() && self.attach(Arc::clone(&source));

        Some(Received {
            raw: message.data,
            origin: message.origin,
            newly_bound,
        })
    }
}

impl fmt::Debug for TransportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBinding")
            .field("endpoint", &self.endpoint.get().map(|e| e.id()))
            .field("target_origin", &self.target_origin)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::identifiers::EndpointId;
    use crate::platform::MessageTarget;

    /// Endpoint that records what was posted to it.
    struct Recorder {
        id: EndpointId,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl Recorder {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id: EndpointId::new(id),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl MessageTarget for Recorder {
        fn id(&self) -> EndpointId {
            self.id
        }

        fn post_message(&self, data: &str, target_origin: &str) -> Result<()> {
            self.sent
                .lock()
                .push((data.to_string(), target_origin.to_string()));
            Ok(())
        }
    }

    fn inbound(data: &str, source: Option<Endpoint>) -> InboundMessage {
        InboundMessage {
            data: data.to_string(),
            origin: "https://a.example".to_string(),
            source,
        }
    }

    #[test]
    fn test_send_before_bound_is_not_ready() {
        let binding = TransportBinding::new("*");
        assert!(!binding.is_ready());
        assert!(matches!(binding.send("x"), Err(Error::NotReady)));
    }

    #[test]
    fn test_send_uses_target_origin() {
        let binding = TransportBinding::new("https://b.example");
        let remote = Recorder::new(1);
        assert!(binding.attach(remote.clone()));

        binding.send("hello").unwrap();
        assert_eq!(
            *remote.sent.lock(),
            vec![("hello".to_string(), "https://b.example".to_string())]
        );
    }

    #[test]
    fn test_endpoint_is_set_once() {
        let binding = TransportBinding::new("*");
        assert!(binding.attach(Recorder::new(1)));
        assert!(!binding.attach(Recorder::new(2)));
        assert_eq!(binding.endpoint().unwrap().id(), EndpointId::new(1));
    }

    #[test]
    fn test_receive_learns_sender() {
        let binding = TransportBinding::new("*");
        let first = binding.receive(inbound("a", Some(Recorder::new(5)))).unwrap();
        let second = binding.receive(inbound("b", Some(Recorder::new(6)))).unwrap();

        assert!(first.newly_bound);
        assert!(!second.newly_bound);
        assert_eq!(second.raw, "b");
        assert_eq!(binding.endpoint().unwrap().id(), EndpointId::new(5));
    }

    #[test]
    fn test_receive_without_source_is_ignored() {
        let binding = TransportBinding::new("*");
        assert!(binding.receive(inbound("a", None)).is_none());
        assert!(!binding.is_ready());
    }
}
