//! The ordered token acquisition chain.

use crate::auth::token::source::{
    AppBridgeSource, CacheSource, HostBridge, InitialTokenSource, LegacyGlobalSource, TokenSource,
};
use crate::auth::token::{SessionToken, TokenCache};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Error returned when every acquisition strategy has been exhausted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// No strategy produced a token. The UI should surface a dismissable
    /// error recommending a page refresh.
    #[error("No session token available from any source; try refreshing the page")]
    NoTokenAvailable,
}

/// Acquires session tokens through an ordered fallback chain.
///
/// Strategies are tried in priority order, each only when the previous one
/// failed:
///
/// 1. the current App Bridge instance,
/// 2. a legacy global bridge reference,
/// 3. the [`TokenCache`],
/// 4. the server-injected initial token.
///
/// Every success is written back to the cache so subsequent callers (and
/// sibling in-flight requests) short-circuit at step 3 until a refresh is
/// forced.
///
/// # Example
///
/// ```rust,ignore
/// let acquirer = TokenAcquirer::builder()
///     .host_bridge(bridge)
///     .initial_token(SessionToken::new(initial))
///     .build();
///
/// let token = acquirer.acquire(false).await?;
/// ```
pub struct TokenAcquirer {
    sources: Vec<Box<dyn TokenSource>>,
    cache: TokenCache,
    loading: Arc<AtomicBool>,
}

impl TokenAcquirer {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> TokenAcquirerBuilder {
        TokenAcquirerBuilder::default()
    }

    /// Acquires a session token, walking the fallback chain.
    ///
    /// `silent` controls observability only: a non-silent acquisition sets
    /// the loading flag (see [`is_loading`](Self::is_loading)) for the
    /// duration of the call so the UI can render a spinner. The algorithm
    /// is identical either way.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::NoTokenAvailable`] when every strategy
    /// failed.
    pub async fn acquire(&self, silent: bool) -> Result<SessionToken, AcquireError> {
        if !silent {
            self.loading.store(true, Ordering::SeqCst);
        }

        let result = self.acquire_inner().await;

        if !silent {
            self.loading.store(false, Ordering::SeqCst);
        }

        result
    }

    async fn acquire_inner(&self) -> Result<SessionToken, AcquireError> {
        for source in &self.sources {
            if let Some(token) = source.try_acquire().await {
                debug!(source = source.name(), "session token acquired");
                // Overwrite so every later caller short-circuits on the cache
                self.cache.put(token.clone());
                return Ok(token);
            }
        }

        error!("all session token sources exhausted");
        Err(AcquireError::NoTokenAvailable)
    }

    /// Returns `true` while a non-silent acquisition is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Returns the cache this acquirer writes to.
    #[must_use]
    pub const fn cache(&self) -> &TokenCache {
        &self.cache
    }
}

// Verify TokenAcquirer is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<TokenAcquirer>();
};

/// Builder for [`TokenAcquirer`].
///
/// Sources are assembled in the fixed priority order regardless of the
/// order builder methods are called in; omitted sources are skipped.
#[derive(Default)]
pub struct TokenAcquirerBuilder {
    host_bridge: Option<Arc<dyn HostBridge>>,
    legacy_bridge: Option<Arc<dyn HostBridge>>,
    initial_token: Option<SessionToken>,
    cache: Option<TokenCache>,
}

impl TokenAcquirerBuilder {
    /// Sets the primary App Bridge handle.
    #[must_use]
    pub fn host_bridge(mut self, bridge: Arc<dyn HostBridge>) -> Self {
        self.host_bridge = Some(bridge);
        self
    }

    /// Sets the legacy global bridge handle.
    #[must_use]
    pub fn legacy_bridge(mut self, bridge: Arc<dyn HostBridge>) -> Self {
        self.legacy_bridge = Some(bridge);
        self
    }

    /// Sets the server-injected initial token.
    #[must_use]
    pub fn initial_token(mut self, token: SessionToken) -> Self {
        self.initial_token = Some(token);
        self
    }

    /// Shares an existing cache instead of creating a fresh one.
    #[must_use]
    pub fn cache(mut self, cache: TokenCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builds the acquirer.
    #[must_use]
    pub fn build(self) -> TokenAcquirer {
        let cache = self.cache.unwrap_or_default();

        let mut sources: Vec<Box<dyn TokenSource>> = Vec::new();
        if let Some(bridge) = self.host_bridge {
            sources.push(Box::new(AppBridgeSource::new(bridge)));
        }
        if let Some(bridge) = self.legacy_bridge {
            sources.push(Box::new(LegacyGlobalSource::new(bridge)));
        }
        sources.push(Box::new(CacheSource::new(cache.clone())));
        sources.push(Box::new(InitialTokenSource::new(self.initial_token)));

        TokenAcquirer {
            sources,
            cache,
            loading: Arc::new(AtomicBool::new(false)),
        }
    }
}
