//! Tenant identity types.
//!
//! A tenant is one independent organization with its own logically isolated
//! database. Tenants are addressed by a [`TenantKey`], a normalized
//! DNS-label-shaped identifier derived from the request subdomain by the
//! web-facing resolver.

mod key;

pub use key::{InvalidTenantKey, ROOT_TENANT, TenantKey};
