//! Upstream API sessions.
//!
//! A [`Session`] holds the platform-issued access token used for Admin API
//! calls. It is distinct from the short-lived App Bridge session token the
//! client side caches; a session is what that token is *exchanged for*.

use crate::config::ShopDomain;
use chrono::{DateTime, Utc};

/// An authenticated connection to a shop's Admin API.
///
/// Sessions are produced by [`crate::auth::exchange`] and consumed by the
/// upstream client. Offline sessions (the default for webhooks and
/// background reconciliation) have no expiration; online sessions expire
/// with the user's admin session.
///
/// # Example
///
/// ```rust
/// use urgify_core::{Session, ShopDomain};
///
/// let session = Session::new(
///     Session::offline_id(&ShopDomain::new("my-store").unwrap()),
///     ShopDomain::new("my-store").unwrap(),
///     "access-token".to_string(),
///     None,
///     false,
///     None,
/// );
///
/// assert!(session.is_active());
/// assert_eq!(session.id, "offline_my-store.myshopify.com");
/// ```
#[derive(Clone, Debug)]
pub struct Session {
    /// Unique identifier for this session.
    pub id: String,

    /// The shop this session is for.
    pub shop: ShopDomain,

    /// The access token for Admin API authentication.
    pub access_token: String,

    /// The granted scope string as reported by the token endpoint.
    pub scope: Option<String>,

    /// Whether this is an online (user-specific) session.
    pub is_online: bool,

    /// When this session expires, if applicable.
    pub expires: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a new session.
    #[must_use]
    pub const fn new(
        id: String,
        shop: ShopDomain,
        access_token: String,
        scope: Option<String>,
        is_online: bool,
        expires: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            shop,
            access_token,
            scope,
            is_online,
            expires,
        }
    }

    /// Returns the canonical id for a shop's offline session.
    #[must_use]
    pub fn offline_id(shop: &ShopDomain) -> String {
        format!("offline_{}", shop.as_ref())
    }

    /// Returns `true` if this session has expired.
    ///
    /// Sessions without an expiration time never expire.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expires.is_some_and(|expires| Utc::now() > expires)
    }

    /// Returns `true` if this session is usable (has a token and is not expired).
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.access_token.is_empty() && !self.expired()
    }
}

// Verify Session is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Session>();
};
