//! Channel configuration.
//!
//! Provides a type-safe version of the options object a page passes when it
//! opens a channel.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use crosswindow::ChannelOptions;
//!
//! let options = ChannelOptions::new()
//!     .with_source("https://b.example/B.html")
//!     .with_origin("https://b.example")
//!     .with_connection_timeout(Duration::from_millis(200));
//!
//! // Or from JSON, with the timeout in milliseconds:
//! let options: ChannelOptions = serde_json::from_str(
//!     r#"{"origin":"https://b.example","source":"B.html","connectionTimeout":200}"#,
//! )?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Target origin that matches any receiver.
pub const ANY_ORIGIN: &str = "*";

/// Target origin that matches the sender's own origin.
pub const SAME_ORIGIN: &str = "/";

/// Default handshake timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(50);

// ============================================================================
// ChannelOptions
// ============================================================================

/// Channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelOptions {
    /// Target-origin filter for every outbound message.
    pub origin: String,

    /// Locator of the remote frame. Setting it makes the channel active.
    pub source: Option<String>,

    /// How long the handshake may take. Also the retry interval for emits
    /// queued before the remote endpoint is known.
    #[serde(deserialize_with = "duration_from_millis")]
    pub connection_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ChannelOptions {
    /// Creates passive options with defaults: any origin, 50ms timeout.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: ANY_ORIGIN.to_string(),
            source: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Creates active options that provision a frame at `source`.
    #[inline]
    #[must_use]
    pub fn active(source: impl Into<String>) -> Self {
        Self::new().with_source(source)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ChannelOptions {
    /// Sets the target-origin filter.
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the remote frame locator.
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ChannelOptions {
    /// Returns `true` if the channel provisions the remote frame itself.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Returns the timeout in whole milliseconds.
    #[inline]
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.connection_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ChannelOptions {
    /// Checks the options and returns a copy with the origin in canonical
    /// form.
    ///
    /// Origins given as full URLs (`https://b.example/page.html`) are reduced
    /// to their origin (`https://b.example`), matching how browsers treat a
    /// postMessage target.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOrigin`] if `origin` is not `*`, `/`, or a URL with a
    ///   tuple origin
    /// - [`Error::Config`] if `source` is empty or the timeout is zero
    pub fn normalized(&self) -> Result<Self> {
        if self.source.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(Error::config("source must not be empty"));
        }

        if self.connection_timeout.is_zero() {
            return Err(Error::config("connection timeout must be greater than zero"));
        }

        Ok(Self {
            origin: canonical_origin(&self.origin)?,
            source: self.source.clone(),
            connection_timeout: self.connection_timeout,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Reduces a target origin to `*`, `/`, or `scheme://host[:port]`.
fn canonical_origin(origin: &str) -> Result<String> {
    if origin == ANY_ORIGIN || origin == SAME_ORIGIN {
        return Ok(origin.to_string());
    }

    let url = Url::parse(origin).map_err(|_| Error::invalid_origin(origin))?;
    let parsed = url.origin();
    if !parsed.is_tuple() {
        return Err(Error::invalid_origin(origin));
    }

    Ok(parsed.ascii_serialization())
}

fn duration_from_millis<'de, D>(deserializer: D) -> StdResult<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ChannelOptions::default();
        assert_eq!(options.origin, "*");
        assert_eq!(options.source, None);
        assert_eq!(options.connection_timeout, Duration::from_millis(50));
        assert!(!options.is_active());
    }

    #[test]
    fn test_active_sets_source() {
        let options = ChannelOptions::active("B.html");
        assert!(options.is_active());
        assert_eq!(options.source.as_deref(), Some("B.html"));
    }

    #[test]
    fn test_deserialize_camel_case() {
        let options: ChannelOptions = serde_json::from_str(
            r#"{"origin":"https://b.example","source":"B.html","connectionTimeout":200}"#,
        )
        .unwrap();

        assert_eq!(options.origin, "https://b.example");
        assert_eq!(options.source.as_deref(), Some("B.html"));
        assert_eq!(options.timeout_ms(), 200);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let options: ChannelOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ChannelOptions::new());
    }

    #[test]
    fn test_normalized_keeps_wildcards() {
        for origin in ["*", "/"] {
            let options = ChannelOptions::new().with_origin(origin).normalized().unwrap();
            assert_eq!(options.origin, origin);
        }
    }

    #[test]
    fn test_normalized_reduces_url_to_origin() {
        let options = ChannelOptions::new()
            .with_origin("https://b.example:8443/path/page.html?q=1")
            .normalized()
            .unwrap();
        assert_eq!(options.origin, "https://b.example:8443");

        let options = ChannelOptions::new()
            .with_origin("https://b.example/")
            .normalized()
            .unwrap();
        assert_eq!(options.origin, "https://b.example");
    }

    #[test]
    fn test_normalized_rejects_bad_origins() {
        for origin in ["", "b.example", "data:text/plain,hi"] {
            let err = ChannelOptions::new()
                .with_origin(origin)
                .normalized()
                .unwrap_err();
            assert!(
                matches!(err, Error::InvalidOrigin { .. }),
                "expected invalid origin for {origin:?}"
            );
        }
    }

    #[test]
    fn test_normalized_rejects_empty_source() {
        let err = ChannelOptions::active("  ").normalized().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_normalized_rejects_zero_timeout() {
        let err = ChannelOptions::new()
            .with_connection_timeout(Duration::ZERO)
            .normalized()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
