//! Shared test doubles and harness builders.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use clinix_tenancy::backends::DataConnection;
use clinix_tenancy::backends::memory::MemoryConnector;
use clinix_tenancy::cache::ConnectionCache;
use clinix_tenancy::config::TenancyConfig;
use clinix_tenancy::directory::{ConnectionCredentials, OrganizationRecord, StaticDirectory};
use clinix_tenancy::error::{TenancyError, TenancyResult};
use clinix_tenancy::factory::{ConnectionFactory, Connector};
use clinix_tenancy::tenant::TenantKey;

/// Connector wrapper that counts connect calls and can inject failures or
/// handshake latency before delegating to the in-memory backend.
pub struct TestConnector {
    inner: MemoryConnector,
    connects: AtomicUsize,
    fail_remaining: AtomicUsize,
    delay: Option<Duration>,
}

impl TestConnector {
    /// A connector that always succeeds immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryConnector::new(),
            connects: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            delay: None,
        })
    }

    /// A connector whose first `failures` connect attempts are refused.
    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryConnector::new(),
            connects: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(failures),
            delay: None,
        })
    }

    /// A connector whose handshake takes `delay` to complete.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryConnector::new(),
            connects: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    /// Number of connect attempts observed so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(
        &self,
        key: &TenantKey,
        credentials: &ConnectionCredentials,
    ) -> TenancyResult<Arc<dyn DataConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let should_fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TenancyError::ConnectionRefused {
                tenant: key.clone(),
                message: "injected connect failure".to_string(),
            });
        }
        self.inner.connect(key, credentials).await
    }
}

/// Parses a tenant key, panicking on bad test input.
pub fn key(s: &str) -> TenantKey {
    TenantKey::parse(s).expect("test tenant key must be valid")
}

/// A directory with one active organization per given key.
pub fn directory_of(tenants: &[&str]) -> StaticDirectory {
    let mut directory = StaticDirectory::new();
    for tenant in tenants {
        directory = directory.with_organization(OrganizationRecord::new(
            key(tenant),
            tenant.to_string(),
            ConnectionCredentials::new("memory://localhost", format!("{}_db", tenant)),
        ));
    }
    directory
}

/// A cache over the given directory and connector with the given config.
pub fn cache_with(
    directory: StaticDirectory,
    connector: Arc<TestConnector>,
    config: TenancyConfig,
) -> Arc<ConnectionCache> {
    let factory = ConnectionFactory::new(Arc::new(directory), connector, config.clone());
    Arc::new(ConnectionCache::new(factory, config))
}
