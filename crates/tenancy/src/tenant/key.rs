//! Tenant key type.
//!
//! This module defines [`TenantKey`], the normalized identifier for a tenant.
//! Keys originate from request subdomains, so the accepted shape is exactly a
//! DNS label: lowercase ASCII alphanumerics and hyphens, no leading or
//! trailing hyphen, at most 63 characters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The reserved key for "no tenant": requests on the bare base domain.
///
/// The value contains underscores, which the [`TenantKey::parse`] charset
/// rejects, so it can never collide with a real tenant key. Traffic under the
/// root key is served by the default/global connection.
pub const ROOT_TENANT: &str = "__root__";

/// Maximum accepted key length, matching the DNS label limit.
const MAX_KEY_LEN: usize = 63;

/// A normalized tenant identifier derived from a request subdomain.
///
/// `TenantKey` can only be obtained through [`TenantKey::parse`] (which
/// lowercases and validates) or [`TenantKey::root`], so holding one is proof
/// that the identifier is well formed.
///
/// # Examples
///
/// ```
/// use clinix_tenancy::tenant::TenantKey;
///
/// let key = TenantKey::parse("Clinic-A").unwrap();
/// assert_eq!(key.as_str(), "clinic-a");
/// assert!(!key.is_root());
///
/// assert!(TenantKey::parse("clinic.a").is_err());
/// assert!(TenantKey::parse("").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantKey(String);

/// Error returned when a string is not a valid tenant key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid tenant key {key:?}: {reason}")]
pub struct InvalidTenantKey {
    /// The rejected input, as given (before normalization).
    pub key: String,
    /// Why the input was rejected.
    pub reason: &'static str,
}

impl InvalidTenantKey {
    fn new(key: &str, reason: &'static str) -> Self {
        Self {
            key: key.to_string(),
            reason,
        }
    }
}

impl TenantKey {
    /// Parses and normalizes a tenant key.
    ///
    /// Uppercase ASCII is lowercased before validation; any other deviation
    /// from the DNS-label shape is rejected.
    pub fn parse(input: &str) -> Result<Self, InvalidTenantKey> {
        if input.is_empty() {
            return Err(InvalidTenantKey::new(input, "key is empty"));
        }
        if input.len() > MAX_KEY_LEN {
            return Err(InvalidTenantKey::new(input, "key exceeds 63 characters"));
        }

        let normalized = input.to_ascii_lowercase();

        if normalized.starts_with('-') || normalized.ends_with('-') {
            return Err(InvalidTenantKey::new(
                input,
                "key must not start or end with a hyphen",
            ));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(InvalidTenantKey::new(
                input,
                "key may only contain lowercase letters, digits, and hyphens",
            ));
        }

        Ok(Self(normalized))
    }

    /// Returns the reserved root key.
    ///
    /// The root key identifies "no tenant": requests that arrive on the bare
    /// base domain and are served by the default/global connection.
    ///
    /// # Examples
    ///
    /// ```
    /// use clinix_tenancy::tenant::TenantKey;
    ///
    /// let root = TenantKey::root();
    /// assert!(root.is_root());
    /// ```
    pub fn root() -> Self {
        Self(ROOT_TENANT.to_string())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is the reserved root key.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_TENANT
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantKey({})", self.0)
    }
}

impl FromStr for TenantKey {
    type Err = InvalidTenantKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TenantKey::parse(s)
    }
}

impl AsRef<str> for TenantKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let key = TenantKey::parse("clinic-a").unwrap();
        assert_eq!(key.as_str(), "clinic-a");

        assert!(TenantKey::parse("a").is_ok());
        assert!(TenantKey::parse("clinic123").is_ok());
        assert!(TenantKey::parse("123clinic").is_ok());
    }

    #[test]
    fn test_parse_normalizes_case() {
        let key = TenantKey::parse("Clinic-A").unwrap();
        assert_eq!(key.as_str(), "clinic-a");
    }

    #[test]
    fn test_parse_rejects_empty() {
        let err = TenantKey::parse("").unwrap_err();
        assert_eq!(err.reason, "key is empty");
    }

    #[test]
    fn test_parse_rejects_bad_charset() {
        assert!(TenantKey::parse("clinic.a").is_err());
        assert!(TenantKey::parse("clinic_a").is_err());
        assert!(TenantKey::parse("clinic/a").is_err());
        assert!(TenantKey::parse("clinic a").is_err());
        assert!(TenantKey::parse("clínica").is_err());
    }

    #[test]
    fn test_parse_rejects_hyphen_edges() {
        assert!(TenantKey::parse("-clinic").is_err());
        assert!(TenantKey::parse("clinic-").is_err());
    }

    #[test]
    fn test_parse_rejects_overlong() {
        let long = "a".repeat(64);
        assert!(TenantKey::parse(&long).is_err());
        let ok = "a".repeat(63);
        assert!(TenantKey::parse(&ok).is_ok());
    }

    #[test]
    fn test_root_key() {
        let root = TenantKey::root();
        assert!(root.is_root());
        assert_eq!(root.as_str(), ROOT_TENANT);

        // The reserved value is outside the parseable charset.
        assert!(TenantKey::parse(ROOT_TENANT).is_err());
    }

    #[test]
    fn test_display_and_debug() {
        let key = TenantKey::parse("clinic-a").unwrap();
        assert_eq!(key.to_string(), "clinic-a");
        assert_eq!(format!("{:?}", key), "TenantKey(clinic-a)");
    }

    #[test]
    fn test_from_str() {
        let key: TenantKey = "clinic-a".parse().unwrap();
        assert_eq!(key.as_str(), "clinic-a");

        let err: Result<TenantKey, _> = "not valid!".parse();
        assert!(err.is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let key = TenantKey::parse("clinic-a").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"clinic-a\"");

        let parsed: TenantKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }
}
