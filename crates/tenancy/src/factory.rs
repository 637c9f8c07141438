//! Connection factory.
//!
//! The factory turns a tenant key into a live [`TenantConnection`]: it
//! resolves the organization's credentials from the directory, gates on the
//! organization being active, and opens the connection with a bounded
//! timeout. It is only ever called from the connection cache's single-flight
//! path; request-handling code never opens connections directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backends::DataConnection;
use crate::config::TenancyConfig;
use crate::connection::TenantConnection;
use crate::directory::{ConnectionCredentials, OrganizationDirectory, OrganizationRecord};
use crate::error::{TenancyError, TenancyResult};
use crate::tenant::TenantKey;

/// Opens a raw data connection from resolved credentials.
///
/// This is the transport seam: the factory owns credential resolution and
/// timeout policy, a connector owns the driver handshake.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes a connection to the tenant's logical database.
    async fn connect(
        &self,
        key: &TenantKey,
        credentials: &ConnectionCredentials,
    ) -> TenancyResult<Arc<dyn DataConnection>>;
}

struct MemoEntry {
    fetched_at: Instant,
    record: OrganizationRecord,
}

/// Resolves credentials and opens tenant connections.
pub struct ConnectionFactory {
    directory: Arc<dyn OrganizationDirectory>,
    connector: Arc<dyn Connector>,
    config: TenancyConfig,
    // Short-term memo of directory records, bounded by directory_cache_ttl.
    memo: Mutex<HashMap<TenantKey, MemoEntry>>,
}

impl ConnectionFactory {
    /// Creates a factory over a directory and a connector.
    pub fn new(
        directory: Arc<dyn OrganizationDirectory>,
        connector: Arc<dyn Connector>,
        config: TenancyConfig,
    ) -> Self {
        Self {
            directory,
            connector,
            config,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a new connection for the tenant.
    ///
    /// The root key bypasses the directory and uses the configured default
    /// credentials. For real tenants the directory is consulted (subject to
    /// the short-term memo): a missing record fails with
    /// [`TenancyError::UnknownTenant`], an inactive one with
    /// [`TenancyError::TenantInactive`], and in neither case is a connection
    /// opened. The driver handshake, including the verification ping, is
    /// bounded by the configured open timeout.
    pub async fn open(&self, key: &TenantKey) -> TenancyResult<TenantConnection> {
        let credentials = self.resolve_credentials(key).await?;

        let timeout = self.config.connection_open_timeout();
        let opened = tokio::time::timeout(timeout, self.establish(key, &credentials)).await;

        match opened {
            Ok(Ok(connection)) => {
                connection.mark_ready();
                debug!(
                    tenant = %key,
                    connection_id = %connection.id(),
                    backend = connection.backend_name(),
                    "opened tenant connection"
                );
                Ok(connection)
            }
            Ok(Err(err)) => {
                warn!(tenant = %key, error = %err, "tenant connection open failed");
                Err(err)
            }
            Err(_) => {
                let err = TenancyError::ConnectionTimeout {
                    tenant: key.clone(),
                    timeout_ms: self.config.connection_open_timeout_ms,
                };
                warn!(tenant = %key, error = %err, "tenant connection open timed out");
                Err(err)
            }
        }
    }

    /// Drops any memoized directory record for the tenant.
    ///
    /// Called on invalidation so rotated credentials are picked up by the
    /// next open.
    pub(crate) fn forget(&self, key: &TenantKey) {
        self.memo.lock().remove(key);
    }

    async fn resolve_credentials(&self, key: &TenantKey) -> TenancyResult<ConnectionCredentials> {
        if key.is_root() {
            return Ok(self.config.default_credentials.clone());
        }

        let record = self.lookup(key).await?;
        let Some(record) = record else {
            return Err(TenancyError::UnknownTenant { tenant: key.clone() });
        };
        if !record.is_active() {
            return Err(TenancyError::TenantInactive { tenant: key.clone() });
        }
        Ok(record.credentials)
    }

    async fn establish(
        &self,
        key: &TenantKey,
        credentials: &ConnectionCredentials,
    ) -> TenancyResult<TenantConnection> {
        let data = self
            .connector
            .connect(key, credentials)
            .await
            .map_err(|err| refused(key, err))?;

        let connection = TenantConnection::new(key.clone(), data);
        if let Err(err) = connection.data().ping().await {
            connection.mark_failed();
            return Err(refused(key, err));
        }
        Ok(connection)
    }

    async fn lookup(&self, key: &TenantKey) -> TenancyResult<Option<OrganizationRecord>> {
        let ttl = self.config.directory_cache_ttl();
        if !ttl.is_zero() {
            let memo = self.memo.lock();
            if let Some(entry) = memo.get(key) {
                if entry.fetched_at.elapsed() < ttl {
                    return Ok(Some(entry.record.clone()));
                }
            }
        }

        let timeout = self.config.directory_timeout();
        let record = match tokio::time::timeout(timeout, self.directory.organization(key)).await {
            Ok(Ok(record)) => record,
            Ok(Err(err)) => {
                return Err(TenancyError::DirectoryUnavailable {
                    tenant: key.clone(),
                    message: err.to_string(),
                });
            }
            Err(_) => {
                return Err(TenancyError::DirectoryUnavailable {
                    tenant: key.clone(),
                    message: format!(
                        "lookup timed out after {}ms",
                        self.config.directory_timeout_ms
                    ),
                });
            }
        };

        if !ttl.is_zero() {
            if let Some(record) = &record {
                self.memo.lock().insert(
                    key.clone(),
                    MemoEntry {
                        fetched_at: Instant::now(),
                        record: record.clone(),
                    },
                );
            }
        }
        Ok(record)
    }
}

/// Collapses transport-level failures into `ConnectionRefused`, keeping
/// already-classified errors as they are.
fn refused(key: &TenantKey, err: TenancyError) -> TenancyError {
    match err {
        TenancyError::Backend { message } => TenancyError::ConnectionRefused {
            tenant: key.clone(),
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::backends::memory::MemoryConnector;
    use crate::connection::ConnectionState;
    use crate::directory::StaticDirectory;

    fn key(s: &str) -> TenantKey {
        TenantKey::parse(s).unwrap()
    }

    fn record(tenant: &str) -> OrganizationRecord {
        OrganizationRecord::new(
            key(tenant),
            tenant.to_string(),
            ConnectionCredentials::new("memory://localhost", format!("{}_db", tenant)),
        )
    }

    /// Counts connect calls before delegating to the in-memory connector.
    struct CountingConnector {
        inner: MemoryConnector,
        connects: AtomicUsize,
    }

    impl CountingConnector {
        fn new() -> Self {
            Self {
                inner: MemoryConnector::new(),
                connects: AtomicUsize::new(0),
            }
        }

        fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(
            &self,
            key: &TenantKey,
            credentials: &ConnectionCredentials,
        ) -> TenancyResult<Arc<dyn DataConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.inner.connect(key, credentials).await
        }
    }

    /// Counts directory lookups.
    struct CountingDirectory {
        inner: StaticDirectory,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl OrganizationDirectory for CountingDirectory {
        async fn organization(
            &self,
            key: &TenantKey,
        ) -> TenancyResult<Option<OrganizationRecord>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.organization(key).await
        }
    }

    /// Connector whose handshake never completes.
    struct StalledConnector;

    #[async_trait]
    impl Connector for StalledConnector {
        async fn connect(
            &self,
            _key: &TenantKey,
            _credentials: &ConnectionCredentials,
        ) -> TenancyResult<Arc<dyn DataConnection>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("handshake should have been timed out");
        }
    }

    fn factory_with(
        directory: StaticDirectory,
        connector: Arc<dyn Connector>,
        config: TenancyConfig,
    ) -> ConnectionFactory {
        ConnectionFactory::new(Arc::new(directory), connector, config)
    }

    #[tokio::test]
    async fn test_open_active_tenant() {
        let factory = factory_with(
            StaticDirectory::new().with_organization(record("clinic-a")),
            Arc::new(MemoryConnector::new()),
            TenancyConfig::default(),
        );

        let connection = factory.open(&key("clinic-a")).await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Ready);
        assert_eq!(connection.tenant().as_str(), "clinic-a");
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let connector = Arc::new(CountingConnector::new());
        let factory = factory_with(
            StaticDirectory::new(),
            connector.clone(),
            TenancyConfig::default(),
        );

        let err = factory.open(&key("clinic-x")).await.unwrap_err();
        assert!(matches!(err, TenancyError::UnknownTenant { .. }));
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_inactive_tenant_opens_nothing() {
        let connector = Arc::new(CountingConnector::new());
        let factory = factory_with(
            StaticDirectory::new().with_organization(record("clinic-b").deactivated()),
            connector.clone(),
            TenancyConfig::default(),
        );

        let err = factory.open(&key("clinic-b")).await.unwrap_err();
        assert!(matches!(err, TenancyError::TenantInactive { .. }));
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_root_key_skips_directory() {
        let directory = Arc::new(CountingDirectory {
            inner: StaticDirectory::new(),
            lookups: AtomicUsize::new(0),
        });
        let factory = ConnectionFactory::new(
            directory.clone(),
            Arc::new(MemoryConnector::new()),
            TenancyConfig::default(),
        );

        let connection = factory.open(&TenantKey::root()).await.unwrap();
        assert!(connection.tenant().is_root());
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_timeout() {
        let factory = factory_with(
            StaticDirectory::new().with_organization(record("clinic-a")),
            Arc::new(StalledConnector),
            TenancyConfig::new().with_connection_open_timeout_ms(2_000),
        );

        let err = factory.open(&key("clinic-a")).await.unwrap_err();
        assert!(matches!(
            err,
            TenancyError::ConnectionTimeout {
                timeout_ms: 2_000,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_memo_within_ttl() {
        let directory = Arc::new(CountingDirectory {
            inner: StaticDirectory::new().with_organization(record("clinic-a")),
            lookups: AtomicUsize::new(0),
        });
        let factory = ConnectionFactory::new(
            directory.clone(),
            Arc::new(MemoryConnector::new()),
            TenancyConfig::new().with_directory_cache_ttl_secs(30),
        );

        factory.open(&key("clinic-a")).await.unwrap();
        factory.open(&key("clinic-a")).await.unwrap();
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 1);

        // Past the TTL the directory is consulted again.
        tokio::time::advance(Duration::from_secs(31)).await;
        factory.open(&key("clinic-a")).await.unwrap();
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forget_clears_memo() {
        let directory = Arc::new(CountingDirectory {
            inner: StaticDirectory::new().with_organization(record("clinic-a")),
            lookups: AtomicUsize::new(0),
        });
        let factory = ConnectionFactory::new(
            directory.clone(),
            Arc::new(MemoryConnector::new()),
            TenancyConfig::default(),
        );

        factory.open(&key("clinic-a")).await.unwrap();
        factory.forget(&key("clinic-a"));
        factory.open(&key("clinic-a")).await.unwrap();
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 2);
    }
}
