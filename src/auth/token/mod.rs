//! Client-side session-token handling.
//!
//! The embedded admin UI needs a valid App Bridge session token on every
//! request it makes back to the app. This module keeps one warm:
//!
//! - [`TokenCache`]: the single last-write-wins cell per "tab"
//! - [`TokenSource`] + the fallback strategies in [`source`]
//! - [`TokenAcquirer`]: the ordered acquisition chain
//! - [`RefreshScheduler`]: background refresh on an interval and on
//!   focus/visibility transitions

pub mod acquirer;
pub mod cache;
pub mod refresh;
pub mod source;

pub use acquirer::{AcquireError, TokenAcquirer, TokenAcquirerBuilder};
pub use cache::{TokenCache, SESSION_TOKEN_KEY};
pub use refresh::{RefreshHandle, RefreshScheduler, RefreshTrigger, REFRESH_INTERVAL};
pub use source::{HostBridge, HostBridgeError, TokenSource};

use std::fmt;

/// An opaque App Bridge session token.
///
/// Short-lived (the platform TTL is roughly a minute) and superseded by the
/// next successful acquisition rather than explicitly destroyed. The value
/// is masked in `Debug` output since it is a bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Consumes the token, returning the raw string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(*****)")
    }
}
