//! Clinix Tenancy Layer
//!
//! This crate implements tenant resolution keys and per-tenant
//! data-connection management for the Clinix platform: one running process
//! serves many independent organizations, each with its own logical database,
//! with connections created lazily, cached, reused safely under concurrent
//! load, and never leaked across tenant boundaries.
//!
//! # Architecture
//!
//! - [`tenant`] - The normalized [`TenantKey`](tenant::TenantKey) and the
//!   reserved root key for bare-domain traffic
//! - [`directory`] - Read-only interface to the organization control plane
//!   (credentials and activation status)
//! - [`factory`] - Opens tenant connections with bounded timeouts
//! - [`cache`] - Keyed store of live connections with single-flight creation,
//!   retry backoff, and idle eviction
//! - [`handle`] - The tenant-scoped facade request code performs data access
//!   through
//! - [`supervisor`] - Background idle sweeps and graceful shutdown
//! - [`backends`] - Tenant database drivers (in-memory by default, MongoDB
//!   behind the `mongodb` feature)
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use clinix_tenancy::backends::memory::MemoryConnector;
//! use clinix_tenancy::cache::ConnectionCache;
//! use clinix_tenancy::config::TenancyConfig;
//! use clinix_tenancy::directory::{ConnectionCredentials, OrganizationRecord, StaticDirectory};
//! use clinix_tenancy::factory::ConnectionFactory;
//! use clinix_tenancy::supervisor::LifecycleSupervisor;
//! use clinix_tenancy::tenant::TenantKey;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), clinix_tenancy::error::TenancyError> {
//! // Describe the tenants this process serves. In production the directory
//! // is backed by the control plane instead of a static set.
//! let clinic_a = TenantKey::parse("clinic-a")?;
//! let directory = StaticDirectory::new().with_organization(OrganizationRecord::new(
//!     clinic_a.clone(),
//!     "Clinic A",
//!     ConnectionCredentials::new("memory://localhost", "clinic_a"),
//! ));
//!
//! // Wire the cache and start the supervisor.
//! let config = TenancyConfig::default();
//! let factory = ConnectionFactory::new(
//!     Arc::new(directory),
//!     Arc::new(MemoryConnector::new()),
//!     config.clone(),
//! );
//! let cache = Arc::new(ConnectionCache::new(factory, config.clone()));
//! let supervisor = LifecycleSupervisor::spawn(Arc::clone(&cache), config);
//!
//! // Per request: resolve a handle and work within the tenant's database.
//! let handle = cache.get(&clinic_a).await?;
//! handle.insert("patients", json!({"name": "Ada"})).await?;
//! assert_eq!(handle.count("patients", json!({})).await?, 1);
//!
//! supervisor.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Tenant isolation
//!
//! A [`TenantHandle`](handle::TenantHandle) is bound to exactly one tenant's
//! connection when the cache issues it. Every operation through the handle
//! addresses that tenant's logical database; there is no way to reach another
//! tenant's data through it, and the cache never hands out a half-initialized
//! connection: callers either get a ready one or an error.
//!
//! # Concurrency
//!
//! Cache lookups are safe under any number of simultaneous callers. A cold
//! key is opened exactly once no matter how many requests race on it
//! (single-flight), and operations on different tenants never wait on each
//! other.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod cache;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod factory;
pub mod handle;
pub mod supervisor;
pub mod tenant;

// Re-export commonly used types at crate root
pub use cache::{CacheStats, ConnectionCache};
pub use config::TenancyConfig;
pub use connection::ConnectionState;
pub use directory::{
    ConnectionCredentials, OrganizationDirectory, OrganizationRecord, OrganizationStatus,
    StaticDirectory,
};
pub use error::{TenancyError, TenancyResult};
pub use factory::{ConnectionFactory, Connector};
pub use handle::TenantHandle;
pub use supervisor::LifecycleSupervisor;
pub use tenant::{ROOT_TENANT, TenantKey};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
