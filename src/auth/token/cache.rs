//! The per-tab session token cache.

use crate::auth::token::SessionToken;
use parking_lot::RwLock;
use std::sync::Arc;

/// Storage key used when mirroring the cache into browser `sessionStorage`.
///
/// The cache itself is process-local; a browser shim that persists it across
/// reloads should use this key so all surfaces agree on the slot.
pub const SESSION_TOKEN_KEY: &str = "shopify_session_token";

/// Process-local cache holding at most one session token.
///
/// This is the single source of truth every client-side component reads
/// from: the [`TokenAcquirer`](crate::auth::token::TokenAcquirer) writes
/// every successful acquisition here, and the authenticated fetch wrapper
/// reads it before falling back to the full acquisition chain.
///
/// # Concurrency
///
/// There is no expiry tracking and no locking protocol beyond the cell
/// itself: concurrent refreshes are resolved by last-write-wins, which is
/// correct because any successfully acquired token is valid at the moment
/// it is written. A failed acquisition never writes.
///
/// Clones share the same underlying cell.
///
/// # Example
///
/// ```rust
/// use urgify_core::auth::token::{SessionToken, TokenCache};
///
/// let cache = TokenCache::new();
/// assert!(cache.get().is_none());
///
/// cache.put(SessionToken::new("tok123"));
/// assert_eq!(cache.get().unwrap().as_ref(), "tok123");
/// ```
#[derive(Clone, Debug, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<SessionToken>>>,
}

impl TokenCache {
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token, if any.
    #[must_use]
    pub fn get(&self) -> Option<SessionToken> {
        self.inner.read().clone()
    }

    /// Overwrites the cache with a newly acquired token.
    pub fn put(&self, token: SessionToken) {
        *self.inner.write() = Some(token);
    }

    /// Clears the cache.
    ///
    /// Not called on logout in the current design; the tab closing is what
    /// normally discards the cache. Exposed for tests and shims.
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Returns `true` if no token is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_none()
    }
}

// Verify TokenCache is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<TokenCache>();
};
