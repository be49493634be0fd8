//! Builder pattern for channel configuration.
//!
//! Provides a fluent API for configuring and creating [`Channel`] instances.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use crosswindow::Channel;
//!
//! let channel = Channel::builder()
//!     .source("B.html")
//!     .origin("https://b.example")
//!     .connection_timeout(Duration::from_millis(200))
//!     .on_connection_fail(|err| eprintln!("{err}"))
//!     .build(platform)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::protocol::{JsonCodec, WireCodec};

use super::core::Channel;
use super::options::ChannelOptions;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked once when the handshake times out.
pub type FailureCallback = Arc<dyn Fn(&Error) + Send + Sync>;

// ============================================================================
// ChannelBuilder
// ============================================================================

/// Builder for configuring a [`Channel`].
///
/// Use [`Channel::builder()`] to create a new builder.
#[derive(Clone)]
pub struct ChannelBuilder {
    /// Origin, source and timeout.
    options: ChannelOptions,
    /// Handshake failure callback.
    on_connection_fail: Option<FailureCallback>,
    /// Wire codec, JSON unless replaced.
    codec: Arc<dyn WireCodec>,
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ChannelBuilder Implementation
// ============================================================================

impl ChannelBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: ChannelOptions::new(),
            on_connection_fail: None,
            codec: Arc::new(JsonCodec),
        }
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the target-origin filter.
    ///
    /// # Arguments
    ///
    /// * `origin` - `"*"`, `"/"`, or an origin such as `"https://b.example"`
    #[inline]
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.options = self.options.with_origin(origin);
        self
    }

    /// Makes the channel active: it provisions a frame at `source`.
    #[inline]
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.options = self.options.with_source(source);
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connection_timeout(timeout);
        self
    }

    /// Sets the callback invoked when the handshake times out.
    ///
    /// Without one, the timeout surfaces as an uncaught error on the
    /// scheduler.
    #[inline]
    #[must_use]
    pub fn on_connection_fail<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_connection_fail = Some(Arc::new(callback));
        self
    }

    /// Replaces the wire codec.
    #[inline]
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn WireCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Validates the options and creates the channel.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOrigin`] if the origin cannot be parsed
    /// - [`Error::Config`] if the source is empty or the timeout is zero
    /// - Platform errors from frame provisioning
    pub fn build(self, platform: Platform) -> Result<Channel> {
        let options = self.options.normalized()?;
        Channel::from_parts(platform, options, self.on_connection_fail, self.codec)
    }
}

impl fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("options", &self.options)
            .field("on_connection_fail", &self.on_connection_fail.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
