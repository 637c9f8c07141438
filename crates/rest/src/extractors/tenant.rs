//! Tenant gateway extractor.
//!
//! [`TenantGateway`] is the one extractor application handlers need: it
//! resolves the request's `Host` header to a tenant and yields a ready
//! [`TenantHandle`] from the connection cache. A handler that takes a
//! `TenantGateway` argument is tenant-scoped by construction.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use clinix_tenancy::handle::TenantHandle;
use clinix_tenancy::tenant::TenantKey;
use tracing::debug;

use crate::error::RestError;
use crate::state::AppState;
use crate::tenant::{ResolvedTenant, TenantSource};

/// Extractor yielding a ready tenant-scoped data handle.
///
/// # Example
///
/// ```rust,ignore
/// use axum::Json;
/// use clinix_rest::extractors::TenantGateway;
/// use serde_json::{Value, json};
///
/// async fn list_patients(gateway: TenantGateway) -> Result<Json<Value>, RestError> {
///     let patients = gateway.handle().find("patients", json!({})).await?;
///     Ok(Json(json!({ "patients": patients })))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TenantGateway {
    handle: TenantHandle,
    resolved: ResolvedTenant,
}

impl TenantGateway {
    /// The tenant-scoped data handle for this request.
    pub fn handle(&self) -> &TenantHandle {
        &self.handle
    }

    /// Consumes the gateway and returns the handle.
    pub fn into_handle(self) -> TenantHandle {
        self.handle
    }

    /// The tenant this request resolved to.
    pub fn tenant(&self) -> &TenantKey {
        self.handle.tenant()
    }

    /// Where the tenant key came from.
    pub fn source(&self) -> TenantSource {
        self.resolved.source
    }
}

/// The request host: `Host` header first, URI authority as the fallback.
fn request_host(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| parts.uri.host().map(str::to_owned))
}

impl FromRequestParts<AppState> for TenantGateway {
    type Rejection = RestError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let host = request_host(parts).ok_or_else(|| RestError::BadRequest {
            message: "request carries no Host header".to_string(),
        })?;

        let resolved = state.resolver().resolve(&host);
        debug!(
            host = %host,
            tenant = %resolved.key,
            source = %resolved.source,
            "resolved request tenant"
        );

        let handle = state.cache().get(&resolved.key).await?;
        Ok(TenantGateway { handle, resolved })
    }
}
