//! Token acquisition strategies.
//!
//! Each strategy implements [`TokenSource`] and answers `None` when it
//! cannot produce a token, so the acquirer can walk an ordered
//! chain-of-responsibility and short-circuit on the first success. Each
//! strategy is independently unit-testable.

use crate::auth::token::{SessionToken, TokenCache};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Boxed future returned by [`HostBridge::id_token`].
pub type BridgeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, HostBridgeError>> + Send + 'a>>;

/// Boxed future returned by [`TokenSource::try_acquire`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Option<SessionToken>> + Send + 'a>>;

/// Error reported by a host bridge when it cannot mint a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostBridgeError {
    /// The bridge is not available in the current embedding context.
    #[error("App Bridge is not available: {reason}")]
    Unavailable {
        /// Why the bridge is unavailable.
        reason: String,
    },

    /// The bridge call itself failed.
    #[error("App Bridge id token request failed: {reason}")]
    RequestFailed {
        /// The failure description from the bridge.
        reason: String,
    },
}

/// Handle to the embedding host's App Bridge instance.
///
/// On a real page this is implemented by a shim over
/// `shopify.idToken()`; in tests it is a stub. Calling it concurrently is
/// safe; every call mints an independent token.
pub trait HostBridge: Send + Sync {
    /// Requests a fresh identity token from the host.
    fn id_token(&self) -> BridgeFuture<'_>;
}

/// A single token acquisition strategy.
pub trait TokenSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Attempts to produce a token. `None` means "try the next strategy".
    fn try_acquire(&self) -> SourceFuture<'_>;
}

/// Strategy 1: ask the current App Bridge instance for a fresh token.
///
/// Bridge failures are soft: they are logged at `warn` and the chain moves
/// on to the next strategy.
pub struct AppBridgeSource {
    bridge: Arc<dyn HostBridge>,
}

impl AppBridgeSource {
    /// Creates a source backed by the given bridge handle.
    #[must_use]
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        Self { bridge }
    }
}

impl TokenSource for AppBridgeSource {
    fn name(&self) -> &'static str {
        "app_bridge"
    }

    fn try_acquire(&self) -> SourceFuture<'_> {
        Box::pin(async move {
            match self.bridge.id_token().await {
                Ok(token) => Some(SessionToken::new(token)),
                Err(error) => {
                    warn!(source = self.name(), %error, "host bridge token request failed");
                    None
                }
            }
        })
    }
}

/// Strategy 2: a legacy global bridge reference.
///
/// Older embed surfaces expose an equivalent method on a global object;
/// this wraps that handle when one was captured at page load.
pub struct LegacyGlobalSource {
    bridge: Arc<dyn HostBridge>,
}

impl LegacyGlobalSource {
    /// Creates a source backed by the legacy bridge handle.
    #[must_use]
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        Self { bridge }
    }
}

impl TokenSource for LegacyGlobalSource {
    fn name(&self) -> &'static str {
        "legacy_global"
    }

    fn try_acquire(&self) -> SourceFuture<'_> {
        Box::pin(async move {
            match self.bridge.id_token().await {
                Ok(token) => Some(SessionToken::new(token)),
                Err(error) => {
                    warn!(source = self.name(), %error, "legacy bridge token request failed");
                    None
                }
            }
        })
    }
}

/// Strategy 3: the cached token from the last successful acquisition.
pub struct CacheSource {
    cache: TokenCache,
}

impl CacheSource {
    /// Creates a source reading from the given cache.
    #[must_use]
    pub fn new(cache: TokenCache) -> Self {
        Self { cache }
    }
}

impl TokenSource for CacheSource {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn try_acquire(&self) -> SourceFuture<'_> {
        Box::pin(async move { self.cache.get() })
    }
}

/// Strategy 4: the token injected at initial page render, if any.
pub struct InitialTokenSource {
    token: Option<SessionToken>,
}

impl InitialTokenSource {
    /// Creates a source holding the server-injected initial token.
    #[must_use]
    pub fn new(token: Option<SessionToken>) -> Self {
        Self { token }
    }
}

impl TokenSource for InitialTokenSource {
    fn name(&self) -> &'static str {
        "initial_render"
    }

    fn try_acquire(&self) -> SourceFuture<'_> {
        Box::pin(async move { self.token.clone() })
    }
}
