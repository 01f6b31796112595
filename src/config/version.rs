//! Shopify Admin API version handling.

use crate::error::ConfigError;
use std::fmt;

/// The Admin API version used for upstream calls.
///
/// Versions follow Shopify's quarterly `YYYY-MM` scheme, with `unstable`
/// available for pre-release features.
///
/// # Example
///
/// ```rust
/// use urgify_core::ApiVersion;
///
/// let version = ApiVersion::new("2025-07").unwrap();
/// assert_eq!(version.as_ref(), "2025-07");
///
/// let latest = ApiVersion::latest();
/// assert!(latest.as_ref().contains('-'));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiVersion(String);

/// The most recent stable API version this crate targets.
const LATEST_STABLE: &str = "2025-07";

impl ApiVersion {
    /// Creates a new validated API version.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidApiVersion`] unless the value is
    /// `unstable` or matches `YYYY-MM` with a quarterly month (01, 04, 07, 10).
    pub fn new(version: impl Into<String>) -> Result<Self, ConfigError> {
        let version = version.into();

        if version == "unstable" {
            return Ok(Self(version));
        }

        let valid = version.len() == 7
            && version.as_bytes()[4] == b'-'
            && version[..4].chars().all(|c| c.is_ascii_digit())
            && matches!(&version[5..], "01" | "04" | "07" | "10");

        if valid {
            Ok(Self(version))
        } else {
            Err(ConfigError::InvalidApiVersion { version })
        }
    }

    /// Returns the latest stable API version.
    #[must_use]
    pub fn latest() -> Self {
        Self(LATEST_STABLE.to_string())
    }

    /// Returns the `unstable` version.
    #[must_use]
    pub fn unstable() -> Self {
        Self("unstable".to_string())
    }

    /// Returns the Admin API base path for this version,
    /// e.g. `/admin/api/2025-07`.
    #[must_use]
    pub fn admin_path(&self) -> String {
        format!("/admin/api/{}", self.0)
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::latest()
    }
}

impl AsRef<str> for ApiVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_quarterly_versions() {
        for v in ["2024-01", "2024-04", "2025-07", "2025-10"] {
            assert!(ApiVersion::new(v).is_ok(), "{v} should be valid");
        }
    }

    #[test]
    fn test_accepts_unstable() {
        assert_eq!(ApiVersion::unstable().as_ref(), "unstable");
    }

    #[test]
    fn test_rejects_non_quarterly_and_garbage() {
        for v in ["2024-02", "2024-13", "202401", "latest", "", "24-01"] {
            assert!(ApiVersion::new(v).is_err(), "{v} should be invalid");
        }
    }

    #[test]
    fn test_admin_path() {
        let version = ApiVersion::new("2025-07").unwrap();
        assert_eq!(version.admin_path(), "/admin/api/2025-07");
    }
}
