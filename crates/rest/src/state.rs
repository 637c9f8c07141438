//! Application state for the tenant gateway.
//!
//! [`AppState`] bundles the connection cache, the host-based tenant
//! resolver, and the server configuration. It is what the consuming
//! application's handlers receive, and it exposes the two operations the
//! application layer builds everything else on: resolve a request host to a
//! tenant, and obtain a ready data-access handle for a tenant.

use std::sync::Arc;

use clinix_tenancy::cache::ConnectionCache;
use clinix_tenancy::handle::TenantHandle;
use clinix_tenancy::tenant::TenantKey;

use crate::config::ServerConfig;
use crate::error::RestResult;
use crate::tenant::{ResolvedTenant, TenantResolver};

/// Shared state for the tenant gateway.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use clinix_rest::{AppState, ServerConfig};
///
/// let state = AppState::new(cache, ServerConfig::from_env());
/// let resolved = state.resolve_tenant("clinic-a.example.com");
/// let handle = state.tenant_handle(&resolved.key).await?;
/// ```
pub struct AppState {
    cache: Arc<ConnectionCache>,
    resolver: Arc<TenantResolver>,
    config: Arc<ServerConfig>,
}

// Manual Clone: all fields are Arcs, the state is cheap to hand to handlers.
impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            resolver: Arc::clone(&self.resolver),
            config: Arc::clone(&self.config),
        }
    }
}

impl AppState {
    /// Creates state over an existing connection cache.
    ///
    /// The tenant resolver is built from the configured base domain.
    pub fn new(cache: Arc<ConnectionCache>, config: ServerConfig) -> Self {
        let resolver = Arc::new(TenantResolver::new(&config.base_domain));
        Self {
            cache,
            resolver,
            config: Arc::new(config),
        }
    }

    /// The connection cache.
    pub fn cache(&self) -> &ConnectionCache {
        &self.cache
    }

    /// A clone of the cache Arc, for background tasks.
    pub fn cache_arc(&self) -> Arc<ConnectionCache> {
        Arc::clone(&self.cache)
    }

    /// The tenant resolver.
    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Resolves a request host to a tenant.
    pub fn resolve_tenant(&self, host: &str) -> ResolvedTenant {
        self.resolver.resolve(host)
    }

    /// Returns a ready data-access handle scoped to the tenant, opening the
    /// connection if needed.
    pub async fn tenant_handle(&self, key: &TenantKey) -> RestResult<TenantHandle> {
        Ok(self.cache.get(key).await?)
    }
}
