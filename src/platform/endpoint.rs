//! Messaging collaborators supplied by the host.
//!
//! These mirror what a browser gives a page: a way to post a string to
//! another window, a system-wide `message` listener, and a way to create a
//! hidden child frame.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::identifiers::{EndpointId, ListenerId};

// ============================================================================
// MessageTarget
// ============================================================================

/// An addressable browsing context (a remote window or frame).
pub trait MessageTarget: Send + Sync {
    /// Identity of the target, for logging and comparisons.
    fn id(&self) -> EndpointId;

    /// Posts `data` to the target.
    ///
    /// The platform enforces `target_origin`: if the target's origin does not
    /// match, the message is dropped without error.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot accept the message at all.
    fn post_message(&self, data: &str, target_origin: &str) -> Result<()>;
}

impl fmt::Debug for dyn MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageTarget").field(&self.id()).finish()
    }
}

/// Shared reference to a remote endpoint.
pub type Endpoint = Arc<dyn MessageTarget>;

// ============================================================================
// InboundMessage
// ============================================================================

/// One message delivered to the local window.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Raw payload string.
    pub data: String,
    /// Origin of the sending window.
    pub origin: String,
    /// Reply handle for the sender, if the platform exposes one.
    pub source: Option<Endpoint>,
}

// ============================================================================
// MessageBus
// ============================================================================

/// Listener for every message delivered to the local window.
pub type MessageListener = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Cross-context message delivery service.
///
/// Listeners see all inbound traffic, including messages meant for other
/// consumers on the same window.
pub trait MessageBus: Send + Sync {
    /// Registers a listener.
    fn add_listener(&self, listener: MessageListener) -> ListenerId;

    /// Removes a listener. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);
}

// ============================================================================
// FrameProvisioner
// ============================================================================

/// Called once the provisioned frame has loaded.
pub type LoadCallback = Box<dyn FnOnce(Endpoint) + Send>;

/// Creates hidden child frames.
pub trait FrameProvisioner: Send + Sync {
    /// Creates a displayless child frame at `source`.
    ///
    /// `on_load` runs after the frame finished loading, with the frame's
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be created.
    fn create_frame(&self, source: &str, on_load: LoadCallback) -> Result<()>;
}
