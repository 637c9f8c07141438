//! Lifecycle supervisor.
//!
//! The supervisor runs the background half of the connection lifecycle: a
//! periodic idle sweep while the process is up, and an orderly teardown of
//! the whole cache at shutdown.
//!
//! Per connection the lifecycle is `connecting` to `ready`, then to `closed`
//! through one of idle eviction, explicit invalidation, or process shutdown.
//! `closed` is terminal; a later `get` for the same tenant creates a new
//! connection instance.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::cache::ConnectionCache;
use crate::config::TenancyConfig;

/// Background task driving idle eviction and shutdown for a cache.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use clinix_tenancy::backends::memory::MemoryConnector;
/// use clinix_tenancy::cache::ConnectionCache;
/// use clinix_tenancy::config::TenancyConfig;
/// use clinix_tenancy::directory::StaticDirectory;
/// use clinix_tenancy::factory::ConnectionFactory;
/// use clinix_tenancy::supervisor::LifecycleSupervisor;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = TenancyConfig::default();
/// let factory = ConnectionFactory::new(
///     Arc::new(StaticDirectory::new()),
///     Arc::new(MemoryConnector::new()),
///     config.clone(),
/// );
/// let cache = Arc::new(ConnectionCache::new(factory, config.clone()));
///
/// let supervisor = LifecycleSupervisor::spawn(Arc::clone(&cache), config);
/// // ... serve requests ...
/// supervisor.shutdown().await;
/// # }
/// ```
pub struct LifecycleSupervisor {
    cache: Arc<ConnectionCache>,
    config: TenancyConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleSupervisor {
    /// Starts the background sweep task.
    ///
    /// The sweep runs every `idle_eviction_interval`, evicting entries idle
    /// past `idle_threshold`. A fatal sweep error (the cache being shut down
    /// underneath the supervisor) stops the task; it is logged for operator
    /// attention and never takes the process down.
    pub fn spawn(cache: Arc<ConnectionCache>, config: TenancyConfig) -> Self {
        let sweeper = Arc::clone(&cache);
        let interval = config.idle_eviction_interval();
        let threshold = config.idle_threshold();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match sweeper.sweep(threshold) {
                    Ok(0) => {}
                    Ok(evicted) => {
                        info!(evicted, "idle sweep evicted tenant connections");
                    }
                    Err(err) => {
                        error!(error = %err, "idle sweep aborted");
                        break;
                    }
                }
            }
        });

        Self {
            cache,
            config,
            task: Mutex::new(Some(task)),
        }
    }

    /// The cache this supervisor manages.
    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    /// Returns `true` while the sweep task is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Stops the sweep task and tears the cache down.
    ///
    /// In-flight operations get up to the configured shutdown grace period
    /// to finish before their connections are closed. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.cache.shutdown(self.config.shutdown_grace()).await;
        info!("tenancy lifecycle supervisor stopped");
    }
}
