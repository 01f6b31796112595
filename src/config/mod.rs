//! Configuration types for the Urgify core.
//!
//! # Overview
//!
//! - [`UrgifyConfig`]: the app configuration consumed by every subsystem
//! - [`UrgifyConfigBuilder`]: fail-fast builder for [`UrgifyConfig`]
//! - [`ApiKey`], [`ApiSecretKey`], [`ShopDomain`], [`HostUrl`]: validated newtypes
//! - [`ApiVersion`]: the Admin API version used for upstream calls
//!
//! # Key Rotation
//!
//! `old_api_secret_key` supports seamless secret rotation: webhook HMAC
//! verification and session-token JWT decoding try the primary key first and
//! fall back to the old key, so in-flight deliveries and embeds survive a
//! rotation.
//!
//! # Example
//!
//! ```rust
//! use urgify_core::{UrgifyConfig, ApiKey, ApiSecretKey, ApiVersion};
//!
//! let config = UrgifyConfig::builder()
//!     .api_key(ApiKey::new("my-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("my-secret").unwrap())
//!     .api_version(ApiVersion::latest())
//!     .is_embedded(true)
//!     .build()
//!     .unwrap();
//!
//! assert!(config.is_embedded());
//! ```

mod newtypes;
mod version;

pub use newtypes::{ApiKey, ApiSecretKey, HostUrl, ShopDomain};
pub use version::ApiVersion;

use crate::error::ConfigError;

/// Configuration for the Urgify core.
///
/// Holds the app credentials, host URL, API version, and the embedded flag.
/// Instances are cheap to clone and safe to share across async tasks.
#[derive(Clone, Debug)]
pub struct UrgifyConfig {
    api_key: ApiKey,
    api_secret_key: ApiSecretKey,
    old_api_secret_key: Option<ApiSecretKey>,
    host: Option<HostUrl>,
    api_version: ApiVersion,
    is_embedded: bool,
}

impl UrgifyConfig {
    /// Creates a new builder for constructing an `UrgifyConfig`.
    #[must_use]
    pub fn builder() -> UrgifyConfigBuilder {
        UrgifyConfigBuilder::new()
    }

    /// Returns the API key (client id).
    #[must_use]
    pub const fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Returns the API secret key.
    #[must_use]
    pub const fn api_secret_key(&self) -> &ApiSecretKey {
        &self.api_secret_key
    }

    /// Returns the old API secret key, if configured for key rotation.
    #[must_use]
    pub const fn old_api_secret_key(&self) -> Option<&ApiSecretKey> {
        self.old_api_secret_key.as_ref()
    }

    /// Returns the app host URL, if configured.
    #[must_use]
    pub const fn host(&self) -> Option<&HostUrl> {
        self.host.as_ref()
    }

    /// Returns the Admin API version.
    #[must_use]
    pub const fn api_version(&self) -> &ApiVersion {
        &self.api_version
    }

    /// Returns `true` if the app runs embedded in the Shopify admin.
    ///
    /// Session-token exchange is only available to embedded apps.
    #[must_use]
    pub const fn is_embedded(&self) -> bool {
        self.is_embedded
    }
}

// Verify UrgifyConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<UrgifyConfig>();
};

/// Builder for [`UrgifyConfig`].
///
/// `api_key` and `api_secret_key` are required; everything else has a
/// sensible default (`api_version` defaults to the latest stable version,
/// `is_embedded` defaults to `true` since Urgify is an embedded app).
#[derive(Debug, Default)]
pub struct UrgifyConfigBuilder {
    api_key: Option<ApiKey>,
    api_secret_key: Option<ApiSecretKey>,
    old_api_secret_key: Option<ApiSecretKey>,
    host: Option<HostUrl>,
    api_version: Option<ApiVersion>,
    is_embedded: Option<bool>,
}

impl UrgifyConfigBuilder {
    /// Creates a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key (required).
    #[must_use]
    pub fn api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Sets the API secret key (required).
    #[must_use]
    pub fn api_secret_key(mut self, api_secret_key: ApiSecretKey) -> Self {
        self.api_secret_key = Some(api_secret_key);
        self
    }

    /// Sets the old API secret key for key rotation.
    #[must_use]
    pub fn old_api_secret_key(mut self, old_api_secret_key: ApiSecretKey) -> Self {
        self.old_api_secret_key = Some(old_api_secret_key);
        self
    }

    /// Sets the app host URL.
    #[must_use]
    pub fn host(mut self, host: HostUrl) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the Admin API version.
    #[must_use]
    pub fn api_version(mut self, api_version: ApiVersion) -> Self {
        self.api_version = Some(api_version);
        self
    }

    /// Sets whether the app runs embedded in the Shopify admin.
    #[must_use]
    pub const fn is_embedded(mut self, is_embedded: bool) -> Self {
        self.is_embedded = Some(is_embedded);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequiredField`] if `api_key` or
    /// `api_secret_key` was not set.
    pub fn build(self) -> Result<UrgifyConfig, ConfigError> {
        let api_key = self
            .api_key
            .ok_or(ConfigError::MissingRequiredField { field: "api_key" })?;
        let api_secret_key = self.api_secret_key.ok_or(ConfigError::MissingRequiredField {
            field: "api_secret_key",
        })?;

        Ok(UrgifyConfig {
            api_key,
            api_secret_key,
            old_api_secret_key: self.old_api_secret_key,
            host: self.host,
            api_version: self.api_version.unwrap_or_default(),
            is_embedded: self.is_embedded.unwrap_or(true),
        })
    }
}
