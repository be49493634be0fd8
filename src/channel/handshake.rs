//! Handshake state machine.
//!
//! ```text
//!                 ping (reply pong) / pong
//!   Unconfirmed ─────────────────────────────► Connected
//!        │
//!        │ timeout
//!        ▼
//!      Failed
//! ```
//!
//! Both `Connected` and `Failed` are terminal. The machine is pure: it only
//! decides, the channel performs the sends and callbacks.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

use crate::protocol::ReservedEvent;

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Handshake not yet completed.
    #[default]
    Unconfirmed,
    /// Both sides reached each other.
    Connected,
    /// The handshake timed out.
    Failed,
}

impl ConnectionState {
    /// Returns `true` for states the handshake never leaves.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Connected | Self::Failed)
    }

    /// Returns the lowercase name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unconfirmed => "unconfirmed",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HandshakeStep
// ============================================================================

/// What the channel must do with an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Not a handshake event for this state; dispatch normally.
    PassThrough,
    /// Consumed; the channel is now connected.
    Connected,
    /// Consumed; the channel is now connected and must answer `pong`.
    ConnectedReplyPong,
}

// ============================================================================
// Handshake
// ============================================================================

/// Tracks the handshake for one channel.
#[derive(Debug, Default)]
pub struct Handshake {
    state: ConnectionState,
}

impl Handshake {
    /// Creates an unconfirmed handshake.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Feeds the reserved event carried by an inbound message, if any.
    ///
    /// Only an unconfirmed handshake reacts. Once settled, `ping` and `pong`
    /// are ordinary events.
    pub fn on_event(&mut self, event: Option<ReservedEvent>) -> HandshakeStep {
        if self.state != ConnectionState::Unconfirmed {
            return HandshakeStep::PassThrough;
        }

        match event {
            Some(ReservedEvent::Ping) => {
                self.state = ConnectionState::Connected;
                HandshakeStep::ConnectedReplyPong
            }
            Some(ReservedEvent::Pong) => {
                self.state = ConnectionState::Connected;
                HandshakeStep::Connected
            }
            None => HandshakeStep::PassThrough,
        }
    }

    /// Handles the connection timer firing.
    ///
    /// Returns `true` if this call moved the handshake to `Failed`.
    pub fn on_timeout(&mut self) -> bool {
        if self.state != ConnectionState::Unconfirmed {
            return false;
        }

        self.state = ConnectionState::Failed;
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unconfirmed() {
        assert_eq!(Handshake::new().state(), ConnectionState::Unconfirmed);
    }

    #[test]
    fn test_ping_connects_and_replies() {
        let mut handshake = Handshake::new();
        let step = handshake.on_event(Some(ReservedEvent::Ping));
        assert_eq!(step, HandshakeStep::ConnectedReplyPong);
        assert_eq!(handshake.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_pong_connects() {
        let mut handshake = Handshake::new();
        assert_eq!(
            handshake.on_event(Some(ReservedEvent::Pong)),
            HandshakeStep::Connected
        );
        assert_eq!(handshake.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_application_events_pass_through() {
        let mut handshake = Handshake::new();
        assert_eq!(handshake.on_event(None), HandshakeStep::PassThrough);
        assert_eq!(handshake.state(), ConnectionState::Unconfirmed);
    }

    #[test]
    fn test_connected_is_idempotent() {
        let mut handshake = Handshake::new();
        handshake.on_event(Some(ReservedEvent::Pong));

        assert_eq!(
            handshake.on_event(Some(ReservedEvent::Ping)),
            HandshakeStep::PassThrough
        );
        assert_eq!(
            handshake.on_event(Some(ReservedEvent::Pong)),
            HandshakeStep::PassThrough
        );
        assert!(!handshake.on_timeout());
        assert_eq!(handshake.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_timeout_fails_once() {
        let mut handshake = Handshake::new();
        assert!(handshake.on_timeout());
        assert!(!handshake.on_timeout());
        assert_eq!(handshake.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_failed_ignores_handshake_events() {
        let mut handshake = Handshake::new();
        handshake.on_timeout();
        assert_eq!(
            handshake.on_event(Some(ReservedEvent::Ping)),
            HandshakeStep::PassThrough
        );
        assert_eq!(handshake.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ConnectionState::Unconfirmed.is_terminal());
        assert!(ConnectionState::Connected.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }
}
