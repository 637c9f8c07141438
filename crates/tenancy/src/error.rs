//! Error types for the tenancy layer.
//!
//! This module defines the error hierarchy for tenant resolution and
//! connection lifecycle management. Errors are grouped by how the caller
//! should react:
//!
//! - non-retryable resolution errors ([`TenancyError::UnknownTenant`],
//!   [`TenancyError::TenantInactive`]): the tenant does not exist or is
//!   disabled; retrying will not help until the control plane changes.
//! - transient connection errors ([`TenancyError::ConnectionTimeout`],
//!   [`TenancyError::ConnectionRefused`],
//!   [`TenancyError::DirectoryUnavailable`]): the next `get` for the tenant
//!   retries after a bounded backoff window.
//! - lifecycle errors ([`TenancyError::ConnectionClosed`],
//!   [`TenancyError::CacheClosed`]): the entry or the whole cache has been
//!   torn down.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::tenant::{InvalidTenantKey, TenantKey};

/// The primary error type for tenancy operations.
///
/// The enum derives `Clone` deliberately: a single failed connection attempt
/// is delivered to every waiter of that attempt, so the error must be
/// duplicable without losing information.
#[derive(Error, Debug, Clone)]
pub enum TenancyError {
    /// No organization record exists for the tenant key.
    #[error("unknown tenant: {tenant}")]
    UnknownTenant { tenant: TenantKey },

    /// The organization exists but is not active.
    #[error("tenant inactive: {tenant}")]
    TenantInactive { tenant: TenantKey },

    /// Opening the tenant connection exceeded the configured timeout.
    #[error("connection open timed out after {timeout_ms}ms for tenant {tenant}")]
    ConnectionTimeout { tenant: TenantKey, timeout_ms: u64 },

    /// The tenant database refused the connection at the transport level.
    #[error("connection refused for tenant {tenant}: {message}")]
    ConnectionRefused { tenant: TenantKey, message: String },

    /// The control-plane lookup failed or timed out.
    #[error("organization directory unavailable for tenant {tenant}: {message}")]
    DirectoryUnavailable { tenant: TenantKey, message: String },

    /// A recent single-flight creation attempt for the tenant failed.
    ///
    /// Returned to callers that arrive while the failure's backoff window is
    /// still open; the wrapped error is the outcome of that attempt.
    #[error("connection creation failed for tenant {tenant}: {source}")]
    CreationFailed {
        tenant: TenantKey,
        source: Box<TenancyError>,
    },

    /// The tenant key could not be parsed.
    #[error(transparent)]
    InvalidKey(#[from] InvalidTenantKey),

    /// The connection was closed while the operation was being issued.
    #[error("connection closed for tenant {tenant}")]
    ConnectionClosed { tenant: TenantKey },

    /// The connection cache has been shut down.
    #[error("connection cache is shut down")]
    CacheClosed,

    /// An internal driver or serialization failure.
    #[error("backend error: {message}")]
    Backend { message: String },
}

impl TenancyError {
    /// Returns `true` if the next `get` for the same tenant may succeed
    /// without any control-plane change.
    ///
    /// Transient errors are recorded for exponential backoff; non-retryable
    /// errors are surfaced immediately and never enter the backoff ledger.
    pub fn is_transient(&self) -> bool {
        match self {
            TenancyError::ConnectionTimeout { .. }
            | TenancyError::ConnectionRefused { .. }
            | TenancyError::DirectoryUnavailable { .. }
            | TenancyError::Backend { .. } => true,
            TenancyError::CreationFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Unwraps [`TenancyError::CreationFailed`] down to the attempt's
    /// original error, leaving other variants untouched.
    pub fn root_cause(&self) -> &TenancyError {
        match self {
            TenancyError::CreationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for TenancyError {
    fn from(err: serde_json::Error) -> Self {
        TenancyError::Backend {
            message: err.to_string(),
        }
    }
}

/// Result type alias for tenancy operations.
pub type TenancyResult<T> = Result<T, TenancyError>;
