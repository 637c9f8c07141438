//! Error types for the tenant gateway.
//!
//! Tenancy errors are mapped to HTTP status codes the way the application
//! layer expects to present them:
//!
//! | Tenancy error | HTTP status |
//! |---------------|-------------|
//! | UnknownTenant | 404 |
//! | TenantInactive | 403 |
//! | InvalidKey | 400 |
//! | ConnectionTimeout / ConnectionRefused | 503 + Retry-After |
//! | DirectoryUnavailable / CreationFailed | 503 + Retry-After |
//! | CacheClosed / ConnectionClosed | 503 + Retry-After |
//! | Backend | 500 |

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use clinix_tenancy::error::TenancyError;
use serde_json::json;
use thiserror::Error;

/// Seconds clients are asked to wait before retrying a 503.
const RETRY_AFTER_SECS: u64 = 5;

/// The primary error type for gateway operations.
#[derive(Error, Debug)]
pub enum RestError {
    /// No organization exists for the resolved tenant (HTTP 404).
    #[error("unknown tenant: {tenant}")]
    TenantNotFound {
        /// The tenant key that failed to resolve.
        tenant: String,
    },

    /// The organization is deactivated (HTTP 403).
    #[error("tenant is deactivated: {tenant}")]
    TenantInactive {
        /// The deactivated tenant key.
        tenant: String,
    },

    /// The tenant's database cannot be reached right now (HTTP 503).
    #[error("tenant database unavailable: {message}")]
    ServiceUnavailable {
        /// Description of the underlying failure.
        message: String,
    },

    /// The request itself was unusable (HTTP 400).
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// An unexpected internal failure (HTTP 500).
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl RestError {
    /// The HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RestError::TenantNotFound { .. } => StatusCode::NOT_FOUND,
            RestError::TenantInactive { .. } => StatusCode::FORBIDDEN,
            RestError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RestError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            RestError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RestError::TenantNotFound { .. } => "unknown-tenant",
            RestError::TenantInactive { .. } => "tenant-inactive",
            RestError::ServiceUnavailable { .. } => "unavailable",
            RestError::BadRequest { .. } => "bad-request",
            RestError::Internal { .. } => "internal",
        }
    }
}

impl From<TenancyError> for RestError {
    fn from(err: TenancyError) -> Self {
        // CreationFailed wraps the failed attempt's error; classify by that.
        match err.root_cause() {
            TenancyError::UnknownTenant { tenant } => RestError::TenantNotFound {
                tenant: tenant.to_string(),
            },
            TenancyError::TenantInactive { tenant } => RestError::TenantInactive {
                tenant: tenant.to_string(),
            },
            TenancyError::InvalidKey(invalid) => RestError::BadRequest {
                message: invalid.to_string(),
            },
            TenancyError::ConnectionTimeout { .. }
            | TenancyError::ConnectionRefused { .. }
            | TenancyError::DirectoryUnavailable { .. }
            | TenancyError::ConnectionClosed { .. }
            | TenancyError::CacheClosed
            | TenancyError::CreationFailed { .. } => RestError::ServiceUnavailable {
                message: err.to_string(),
            },
            TenancyError::Backend { .. } => RestError::Internal {
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        let mut response = (status, body).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, RETRY_AFTER_SECS.into());
        }
        response
    }
}

/// Result type alias for gateway operations.
pub type RestResult<T> = Result<T, RestError>;
