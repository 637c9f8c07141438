//! Configuration for the tenancy layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::directory::ConnectionCredentials;

/// Configuration for the connection cache, factory, and supervisor.
///
/// All durations are stored in integral units so the struct stays plainly
/// (de)serializable; accessor methods expose them as [`Duration`].
///
/// # Example
///
/// ```
/// use clinix_tenancy::config::TenancyConfig;
///
/// let config = TenancyConfig::new()
///     .with_idle_threshold_secs(600)
///     .with_connection_open_timeout_ms(5_000);
/// assert_eq!(config.idle_threshold().as_secs(), 600);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// How long a connection may sit unused before a sweep evicts it.
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,

    /// Interval between background sweeps.
    #[serde(default = "default_idle_eviction_interval_secs")]
    pub idle_eviction_interval_secs: u64,

    /// Upper bound on opening one tenant connection.
    #[serde(default = "default_connection_open_timeout_ms")]
    pub connection_open_timeout_ms: u64,

    /// Upper bound on one organization-directory lookup.
    #[serde(default = "default_directory_timeout_ms")]
    pub directory_timeout_ms: u64,

    /// Cap on the exponential retry backoff after failed opens.
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,

    /// How long a fetched organization record may be reused before the
    /// directory is consulted again.
    #[serde(default = "default_directory_cache_ttl_secs")]
    pub directory_cache_ttl_secs: u64,

    /// Grace period for in-flight operations during shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Credentials for the default/global connection serving root-domain
    /// traffic (the reserved root tenant key).
    #[serde(default)]
    pub default_credentials: ConnectionCredentials,
}

fn default_idle_threshold_secs() -> u64 {
    600 // 10 minutes
}

fn default_idle_eviction_interval_secs() -> u64 {
    60
}

fn default_connection_open_timeout_ms() -> u64 {
    5_000
}

fn default_directory_timeout_ms() -> u64 {
    3_000
}

fn default_max_retry_backoff_ms() -> u64 {
    30_000
}

fn default_directory_cache_ttl_secs() -> u64 {
    30
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold_secs(),
            idle_eviction_interval_secs: default_idle_eviction_interval_secs(),
            connection_open_timeout_ms: default_connection_open_timeout_ms(),
            directory_timeout_ms: default_directory_timeout_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
            directory_cache_ttl_secs: default_directory_cache_ttl_secs(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            default_credentials: ConnectionCredentials::default(),
        }
    }
}

impl TenancyConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the idle threshold in seconds.
    pub fn with_idle_threshold_secs(mut self, secs: u64) -> Self {
        self.idle_threshold_secs = secs;
        self
    }

    /// Sets the sweep interval in seconds.
    pub fn with_idle_eviction_interval_secs(mut self, secs: u64) -> Self {
        self.idle_eviction_interval_secs = secs;
        self
    }

    /// Sets the connection open timeout in milliseconds.
    pub fn with_connection_open_timeout_ms(mut self, ms: u64) -> Self {
        self.connection_open_timeout_ms = ms;
        self
    }

    /// Sets the directory lookup timeout in milliseconds.
    pub fn with_directory_timeout_ms(mut self, ms: u64) -> Self {
        self.directory_timeout_ms = ms;
        self
    }

    /// Sets the maximum retry backoff in milliseconds.
    pub fn with_max_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.max_retry_backoff_ms = ms;
        self
    }

    /// Sets the directory record reuse window in seconds.
    pub fn with_directory_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.directory_cache_ttl_secs = secs;
        self
    }

    /// Sets the shutdown grace period in milliseconds.
    pub fn with_shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.shutdown_grace_ms = ms;
        self
    }

    /// Sets the credentials backing the root-domain connection.
    pub fn with_default_credentials(mut self, credentials: ConnectionCredentials) -> Self {
        self.default_credentials = credentials;
        self
    }

    /// The idle threshold as a [`Duration`].
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    /// The sweep interval as a [`Duration`].
    pub fn idle_eviction_interval(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_interval_secs)
    }

    /// The connection open timeout as a [`Duration`].
    pub fn connection_open_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_open_timeout_ms)
    }

    /// The directory lookup timeout as a [`Duration`].
    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }

    /// The maximum retry backoff as a [`Duration`].
    pub fn max_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.max_retry_backoff_ms)
    }

    /// The directory record reuse window as a [`Duration`].
    pub fn directory_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_cache_ttl_secs)
    }

    /// The shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
