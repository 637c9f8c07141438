//! Tenant resolution from the request host.
//!
//! Provides the [`TenantResolver`], a pure function from a `Host` header
//! string to a tenant key. Malformed input never fails resolution; it routes
//! to the root tenant instead, because a garbled `Host` header should produce
//! a "no such tenant here" response from the application, not a 500.

use clinix_tenancy::tenant::TenantKey;
use tracing::trace;

use super::source::TenantSource;

/// Result of resolving a tenant from a request host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTenant {
    /// The resolved tenant key; the reserved root key when no subdomain
    /// named a tenant.
    pub key: TenantKey,
    /// Where the key came from.
    pub source: TenantSource,
}

impl ResolvedTenant {
    fn fallback() -> Self {
        Self {
            key: TenantKey::root(),
            source: TenantSource::Fallback,
        }
    }

    /// Returns `true` if the request resolved to the root tenant.
    pub fn is_root(&self) -> bool {
        self.key.is_root()
    }

    /// The tenant key as a string reference.
    pub fn key_str(&self) -> &str {
        self.key.as_str()
    }
}

/// Derives tenant keys from request hosts by stripping a base domain.
///
/// # Examples
///
/// ```
/// use clinix_rest::tenant::TenantResolver;
///
/// let resolver = TenantResolver::new("example.com");
///
/// let resolved = resolver.resolve("clinic-a.example.com");
/// assert_eq!(resolved.key_str(), "clinic-a");
///
/// // The bare base domain routes to the root tenant.
/// assert!(resolver.resolve("example.com").is_root());
/// ```
#[derive(Debug, Clone)]
pub struct TenantResolver {
    base_domain: String,
}

impl TenantResolver {
    /// Creates a resolver for the given base domain.
    ///
    /// The domain is normalized the same way request hosts are (lowercased,
    /// surrounding dots stripped).
    pub fn new(base_domain: impl Into<String>) -> Self {
        let base_domain = base_domain
            .into()
            .trim()
            .trim_matches('.')
            .to_ascii_lowercase();
        Self { base_domain }
    }

    /// The configured base domain.
    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Resolves a request host to a tenant.
    ///
    /// The leftmost label in front of the base domain is the tenant key.
    /// Everything else resolves to the root tenant: the bare base domain, a
    /// `www` prefix, hosts outside the base domain, syntactically invalid
    /// hostnames, and labels that are not valid tenant keys.
    pub fn resolve(&self, host: &str) -> ResolvedTenant {
        let Some(host) = normalize_host(host) else {
            return ResolvedTenant::fallback();
        };
        if !is_valid_hostname(&host) {
            trace!(host = %host, "malformed request host, using root tenant");
            return ResolvedTenant::fallback();
        }
        if host == self.base_domain {
            return ResolvedTenant::fallback();
        }
        let Some(prefix) = host
            .strip_suffix(&self.base_domain)
            .and_then(|p| p.strip_suffix('.'))
        else {
            trace!(host = %host, "host outside base domain, using root tenant");
            return ResolvedTenant::fallback();
        };

        let label = prefix.split('.').next().unwrap_or("");
        if label == "www" {
            return ResolvedTenant::fallback();
        }
        match TenantKey::parse(label) {
            Ok(key) => ResolvedTenant {
                key,
                source: TenantSource::Subdomain,
            },
            Err(err) => {
                trace!(host = %host, error = %err, "subdomain is not a tenant key, using root tenant");
                ResolvedTenant::fallback()
            }
        }
    }
}

/// Strips whitespace, an optional port, and a trailing dot; lowercases.
/// Returns `None` for input with no usable hostname in it.
fn normalize_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Bracketed IPv6 literals are never tenant subdomains.
    if trimmed.starts_with('[') {
        return None;
    }
    let without_port = match trimmed.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        Some(_) => return None,
        None => trimmed,
    };
    let host = without_port.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() { None } else { Some(host) }
}

/// Syntactic hostname check: dot-separated labels of 1 to 63 characters,
/// ASCII alphanumerics and hyphens, no hyphen at a label edge, 253 chars
/// total.
fn is_valid_hostname(host: &str) -> bool {
    if host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
