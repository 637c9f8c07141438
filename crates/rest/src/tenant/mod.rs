//! Host-based tenant resolution.
//!
//! This module derives a tenant key from an inbound request's `Host` header:
//! the known base domain suffix is stripped and the leftmost subdomain label
//! becomes the key. `clinic-a.example.com` resolves to tenant `clinic-a`;
//! the bare base domain, `www`, foreign domains, and anything malformed all
//! resolve to the reserved root key so that routing stays non-fatal.

mod resolver;
mod source;

pub use resolver::{ResolvedTenant, TenantResolver};
pub use source::TenantSource;
