//! Connection cache with single-flight creation.
//!
//! The cache owns every live [`TenantConnection`] in the process, keyed by
//! tenant. Lookups on a warm key return immediately; a cold key triggers
//! exactly one factory open regardless of how many callers arrive at once,
//! and every caller of that attempt receives the same connection or the same
//! error. This is the property that keeps a burst of first-requests for a
//! cold tenant from opening a pile of redundant database connections.
//!
//! # Single flight
//!
//! The first caller to miss installs a `Connecting` slot holding a
//! [`watch`] channel and spawns the open on a separate task; later callers
//! find the slot and subscribe to the same channel. Because the open runs in
//! its own task, a caller that gives up (client disconnect) abandons only its
//! own wait; the open still completes and is delivered to the remaining
//! waiters.
//!
//! # Failure and retry
//!
//! A failed open never poisons the key. Transient failures are recorded with
//! an exponential backoff window (500ms doubling up to the configured cap);
//! a `get` inside the window is refused immediately with the recorded error,
//! the first `get` after it retries. Non-retryable failures (unknown or
//! inactive tenant) are never recorded: they are cheap to re-derive and
//! resolve themselves only through the control plane.
//!
//! The map lock is held only for short synchronous sections, never across an
//! `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::TenancyConfig;
use crate::connection::TenantConnection;
use crate::error::{TenancyError, TenancyResult};
use crate::factory::ConnectionFactory;
use crate::handle::TenantHandle;
use crate::tenant::TenantKey;

/// Backoff after the first failed open; doubles per consecutive failure.
const INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Poll step while draining in-flight operations.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

type CreationOutcome = Result<Arc<TenantConnection>, TenancyError>;
type OutcomeReceiver = watch::Receiver<Option<CreationOutcome>>;

enum Slot {
    Ready(Arc<TenantConnection>),
    Connecting(OutcomeReceiver),
}

struct FailureRecord {
    attempts: u32,
    last_attempt: Instant,
    last_error: TenancyError,
}

struct CacheInner {
    entries: HashMap<TenantKey, Slot>,
    failures: HashMap<TenantKey, FailureRecord>,
    closed: bool,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    creations: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

/// Monotonic counters describing cache activity since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from a ready entry.
    pub hits: u64,
    /// Lookups that found no ready entry (includes joins of an in-flight
    /// creation).
    pub misses: u64,
    /// Successful factory opens.
    pub creations: u64,
    /// Failed factory opens.
    pub failures: u64,
    /// Entries removed by idle sweeps.
    pub evictions: u64,
    /// Entries removed by explicit invalidation.
    pub invalidations: u64,
}

/// Keyed store of live tenant connections.
///
/// The cache is constructed explicitly at process start and torn down through
/// [`ConnectionCache::shutdown`]; it is the sole owner and sole mutator of
/// connection lifecycle state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use clinix_tenancy::backends::memory::MemoryConnector;
/// use clinix_tenancy::cache::ConnectionCache;
/// use clinix_tenancy::config::TenancyConfig;
/// use clinix_tenancy::directory::{ConnectionCredentials, OrganizationRecord, StaticDirectory};
/// use clinix_tenancy::factory::ConnectionFactory;
/// use clinix_tenancy::tenant::TenantKey;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), clinix_tenancy::error::TenancyError> {
/// let key = TenantKey::parse("clinic-a")?;
/// let directory = StaticDirectory::new().with_organization(OrganizationRecord::new(
///     key.clone(),
///     "Clinic A",
///     ConnectionCredentials::new("memory://localhost", "clinic_a"),
/// ));
/// let factory = ConnectionFactory::new(
///     Arc::new(directory),
///     Arc::new(MemoryConnector::new()),
///     TenancyConfig::default(),
/// );
/// let cache = ConnectionCache::new(factory, TenancyConfig::default());
///
/// let handle = cache.get(&key).await?;
/// assert_eq!(handle.tenant(), &key);
/// # Ok(())
/// # }
/// ```
pub struct ConnectionCache {
    inner: Arc<Mutex<CacheInner>>,
    factory: Arc<ConnectionFactory>,
    config: TenancyConfig,
    counters: Arc<Counters>,
}

impl ConnectionCache {
    /// Creates an empty cache over the given factory.
    pub fn new(factory: ConnectionFactory, config: TenancyConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                failures: HashMap::new(),
                closed: false,
            })),
            factory: Arc::new(factory),
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns a handle bound to the tenant's connection, opening it if
    /// needed.
    ///
    /// On a hit the cached connection is returned immediately and its
    /// last-used timestamp refreshed. On a miss the call suspends until the
    /// single in-flight creation for this key completes; it never waits
    /// behind another tenant's creation.
    pub async fn get(&self, key: &TenantKey) -> TenancyResult<TenantHandle> {
        let rx = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(TenancyError::CacheClosed);
            }
            match inner.entries.get(key) {
                Some(Slot::Ready(connection)) => {
                    connection.touch();
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(TenantHandle::new(Arc::clone(connection)));
                }
                Some(Slot::Connecting(rx)) => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    rx.clone()
                }
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    if let Some(record) = inner.failures.get(key) {
                        let window = retry_backoff(record.attempts, self.config.max_retry_backoff());
                        if record.last_attempt.elapsed() < window {
                            return Err(TenancyError::CreationFailed {
                                tenant: key.clone(),
                                source: Box::new(record.last_error.clone()),
                            });
                        }
                    }
                    let (tx, rx) = watch::channel(None);
                    inner.entries.insert(key.clone(), Slot::Connecting(rx.clone()));
                    self.spawn_creation(key.clone(), tx, rx.clone());
                    rx
                }
            }
        };

        await_outcome(key, rx).await
    }

    /// Forcibly closes and removes the tenant's entry.
    ///
    /// Used when an organization is deactivated or its credentials rotate.
    /// Holders of existing handles may finish their current operation; new
    /// `get` calls trigger a fresh creation. Returns `true` if an entry was
    /// removed.
    ///
    /// Must be called from within a Tokio runtime: the underlying close runs
    /// on a spawned task so invalidation stays prompt.
    pub fn invalidate(&self, key: &TenantKey) -> bool {
        self.factory.forget(key);
        let slot = {
            let mut inner = self.inner.lock();
            inner.failures.remove(key);
            inner.entries.remove(key)
        };
        match slot {
            Some(Slot::Ready(connection)) => {
                self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
                info!(
                    tenant = %key,
                    connection_id = %connection.id(),
                    "invalidating tenant connection"
                );
                spawn_drain_and_close(connection, self.config.shutdown_grace());
                true
            }
            Some(Slot::Connecting(_)) => {
                // The creation task notices the slot is gone and delivers its
                // result to the waiters without caching it.
                self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
                debug!(tenant = %key, "invalidated tenant while connection open in flight");
                true
            }
            None => false,
        }
    }

    /// Invalidates every entry. See [`ConnectionCache::invalidate`].
    pub fn invalidate_all(&self) {
        let keys: Vec<TenantKey> = {
            let inner = self.inner.lock();
            inner.entries.keys().cloned().collect()
        };
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Number of cached entries, including in-flight creations.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if the tenant has a cached entry.
    pub fn contains(&self, key: &TenantKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Returns `true` once [`ConnectionCache::shutdown`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            creations: self.counters.creations.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Removes entries that have been idle past the threshold, closing their
    /// connections cleanly. Returns the number of entries evicted.
    ///
    /// Entries with operations still in flight are skipped regardless of
    /// their timestamps. Runs on a fixed interval from the
    /// [`LifecycleSupervisor`](crate::supervisor::LifecycleSupervisor),
    /// decoupled from request handling.
    pub fn sweep(&self, idle_threshold: Duration) -> TenancyResult<usize> {
        let evicted: Vec<Arc<TenantConnection>> = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(TenancyError::CacheClosed);
            }
            let expired: Vec<TenantKey> = inner
                .entries
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready(connection)
                        if connection.idle_for() >= idle_threshold
                            && connection.in_flight() == 0 =>
                    {
                        Some(key.clone())
                    }
                    _ => None,
                })
                .collect();
            expired
                .into_iter()
                .filter_map(|key| match inner.entries.remove(&key) {
                    Some(Slot::Ready(connection)) => Some(connection),
                    Some(other) => {
                        inner.entries.insert(key, other);
                        None
                    }
                    None => None,
                })
                .collect()
        };

        for connection in &evicted {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(
                tenant = %connection.tenant(),
                connection_id = %connection.id(),
                idle = ?connection.idle_for(),
                "evicting idle tenant connection"
            );
            connection.mark_closed();
            let connection = Arc::clone(connection);
            tokio::spawn(async move {
                if let Err(err) = connection.close_data().await {
                    warn!(
                        tenant = %connection.tenant(),
                        error = %err,
                        "error closing evicted connection"
                    );
                }
            });
        }
        Ok(evicted.len())
    }

    /// Closes every entry and refuses further lookups.
    ///
    /// In-flight operations get up to the grace period to finish before the
    /// underlying connections are closed. Idempotent.
    pub async fn shutdown(&self, grace: Duration) {
        let drained: Vec<Slot> = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.failures.clear();
            inner.entries.drain().map(|(_, slot)| slot).collect()
        };

        let connections: Vec<Arc<TenantConnection>> = drained
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Ready(connection) => Some(connection),
                // In-flight creations observe the closed flag when they
                // finish and tear their connection down themselves.
                Slot::Connecting(_) => None,
            })
            .collect();

        if connections.is_empty() {
            return;
        }
        info!(connections = connections.len(), "shutting down connection cache");

        for connection in &connections {
            connection.mark_closed();
        }
        let deadline = Instant::now() + grace;
        while connections.iter().any(|c| c.in_flight() > 0) && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        for connection in connections {
            if let Err(err) = connection.close_data().await {
                warn!(
                    tenant = %connection.tenant(),
                    error = %err,
                    "error closing connection during shutdown"
                );
            }
        }
    }

    fn spawn_creation(
        &self,
        key: TenantKey,
        tx: watch::Sender<Option<CreationOutcome>>,
        rx: OutcomeReceiver,
    ) {
        let factory = Arc::clone(&self.factory);
        let inner = Arc::clone(&self.inner);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            let opened = factory.open(&key).await.map(Arc::new);

            let publish: CreationOutcome = {
                let mut inner = inner.lock();
                match opened {
                    Ok(connection) => {
                        counters.creations.fetch_add(1, Ordering::Relaxed);
                        if inner.closed {
                            connection.mark_closed();
                            let doomed = Arc::clone(&connection);
                            tokio::spawn(async move {
                                let _ = doomed.close_data().await;
                            });
                            Err(TenancyError::CacheClosed)
                        } else {
                            inner.failures.remove(&key);
                            let still_current = matches!(
                                inner.entries.get(&key),
                                Some(Slot::Connecting(existing)) if existing.same_channel(&rx)
                            );
                            if still_current {
                                inner
                                    .entries
                                    .insert(key.clone(), Slot::Ready(Arc::clone(&connection)));
                            } else {
                                // Invalidated while the open was in flight:
                                // deliver to the waiters without caching; the
                                // connection is released when the last handle
                                // drops.
                                debug!(
                                    tenant = %key,
                                    "created connection superseded by invalidation"
                                );
                            }
                            Ok(connection)
                        }
                    }
                    Err(err) => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        let still_current = matches!(
                            inner.entries.get(&key),
                            Some(Slot::Connecting(existing)) if existing.same_channel(&rx)
                        );
                        if still_current {
                            inner.entries.remove(&key);
                        }
                        if err.is_transient() {
                            let record =
                                inner.failures.entry(key.clone()).or_insert(FailureRecord {
                                    attempts: 0,
                                    last_attempt: Instant::now(),
                                    last_error: err.clone(),
                                });
                            record.attempts += 1;
                            record.last_attempt = Instant::now();
                            record.last_error = err.clone();
                        }
                        Err(err)
                    }
                }
            };

            let _ = tx.send(Some(publish));
        });
    }
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn await_outcome(key: &TenantKey, mut rx: OutcomeReceiver) -> TenancyResult<TenantHandle> {
    loop {
        let current = rx.borrow().clone();
        if let Some(outcome) = current {
            return match outcome {
                Ok(connection) => {
                    connection.touch();
                    Ok(TenantHandle::new(connection))
                }
                Err(err) => Err(err),
            };
        }
        if rx.changed().await.is_err() {
            // The sender only drops without publishing when the runtime tore
            // the creation task down.
            return Err(TenancyError::CreationFailed {
                tenant: key.clone(),
                source: Box::new(TenancyError::Backend {
                    message: "connection creation task aborted".to_string(),
                }),
            });
        }
    }
}

fn retry_backoff(attempts: u32, max: Duration) -> Duration {
    let shift = attempts.saturating_sub(1).min(16);
    INITIAL_RETRY_BACKOFF.saturating_mul(1u32 << shift).min(max)
}

fn spawn_drain_and_close(connection: Arc<TenantConnection>, grace: Duration) {
    connection.mark_closed();
    tokio::spawn(async move {
        let deadline = Instant::now() + grace;
        while connection.in_flight() > 0 && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        if let Err(err) = connection.close_data().await {
            warn!(
                tenant = %connection.tenant(),
                error = %err,
                "error closing invalidated connection"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryConnector;
    use crate::directory::{ConnectionCredentials, OrganizationRecord, StaticDirectory};

    fn key(s: &str) -> TenantKey {
        TenantKey::parse(s).unwrap()
    }

    fn cache_with(tenants: &[&str]) -> ConnectionCache {
        let mut directory = StaticDirectory::new();
        for tenant in tenants {
            directory = directory.with_organization(OrganizationRecord::new(
                key(tenant),
                tenant.to_string(),
                ConnectionCredentials::new("memory://localhost", format!("{}_db", tenant)),
            ));
        }
        let config = TenancyConfig::default();
        let factory = ConnectionFactory::new(
            Arc::new(directory),
            Arc::new(MemoryConnector::new()),
            config.clone(),
        );
        ConnectionCache::new(factory, config)
    }

    #[tokio::test]
    async fn test_get_caches_connection() {
        let cache = cache_with(&["clinic-a"]);
        assert_eq!(cache.size(), 0);

        let first = cache.get(&key("clinic-a")).await.unwrap();
        assert_eq!(cache.size(), 1);

        let second = cache.get(&key("clinic-a")).await.unwrap();
        assert_eq!(first.connection_id(), second.connection_id());

        let stats = cache.stats();
        assert_eq!(stats.creations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_distinct_tenants_get_distinct_connections() {
        let cache = cache_with(&["clinic-a", "clinic-b"]);

        let a = cache.get(&key("clinic-a")).await.unwrap();
        let b = cache.get(&key("clinic-b")).await.unwrap();
        assert_ne!(a.connection_id(), b.connection_id());
        assert_eq!(cache.size(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_then_get_creates_fresh_connection() {
        let cache = cache_with(&["clinic-a"]);

        let before = cache.get(&key("clinic-a")).await.unwrap();
        assert!(cache.invalidate(&key("clinic-a")));
        assert_eq!(cache.size(), 0);

        let after = cache.get(&key("clinic-a")).await.unwrap();
        assert_ne!(before.connection_id(), after.connection_id());
        assert_eq!(cache.stats().creations, 2);
    }

    #[tokio::test]
    async fn test_invalidate_unknown_key_is_noop() {
        let cache = cache_with(&["clinic-a"]);
        assert!(!cache.invalidate(&key("clinic-a")));
        assert_eq!(cache.stats().invalidations, 0);
    }

    #[tokio::test]
    async fn test_unknown_tenant_error() {
        let cache = cache_with(&[]);
        let err = cache.get(&key("clinic-x")).await.unwrap_err();
        assert!(matches!(err, TenancyError::UnknownTenant { .. }));
        // Non-retryable failures leave no entry behind.
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_idle_entries() {
        let cache = cache_with(&["clinic-a", "clinic-b"]);
        cache.get(&key("clinic-a")).await.unwrap();
        cache.get(&key("clinic-b")).await.unwrap();

        tokio::time::advance(Duration::from_secs(300)).await;
        // Refresh clinic-b only.
        cache.get(&key("clinic-b")).await.unwrap();

        let evicted = cache.sweep(Duration::from_secs(240)).unwrap();
        assert_eq!(evicted, 1);
        assert!(!cache.contains(&key("clinic-a")));
        assert!(cache.contains(&key("clinic-b")));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_further_gets() {
        let cache = cache_with(&["clinic-a"]);
        cache.get(&key("clinic-a")).await.unwrap();

        cache.shutdown(Duration::from_millis(100)).await;
        assert!(cache.is_closed());
        assert_eq!(cache.size(), 0);

        let err = cache.get(&key("clinic-a")).await.unwrap_err();
        assert!(matches!(err, TenancyError::CacheClosed));

        let err = cache.sweep(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TenancyError::CacheClosed));

        // Second shutdown is a no-op.
        cache.shutdown(Duration::from_millis(100)).await;
    }

    #[test]
    fn test_retry_backoff_doubles_to_cap() {
        let max = Duration::from_secs(30);
        assert_eq!(retry_backoff(1, max), Duration::from_millis(500));
        assert_eq!(retry_backoff(2, max), Duration::from_millis(1_000));
        assert_eq!(retry_backoff(3, max), Duration::from_millis(2_000));
        assert_eq!(retry_backoff(7, max), Duration::from_secs(30));
        assert_eq!(retry_backoff(32, max), Duration::from_secs(30));
    }
}
