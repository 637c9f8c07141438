//! Server configuration for the tenant gateway.
//!
//! This module provides configuration for the HTTP-facing layer, supporting
//! both programmatic construction and environment variable overrides.
//! Duration-valued options accept human-friendly strings (`10m`, `5s`,
//! `1500ms`) via humantime.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CLINIX_BASE_DOMAIN` | localhost | Suffix stripped when resolving tenant subdomains |
//! | `CLINIX_DEFAULT_DATABASE_URI` | memory://localhost | URI of the default/global database |
//! | `CLINIX_DEFAULT_DATABASE_NAME` | clinix | Name of the default/global database |
//! | `CLINIX_LOG_LEVEL` | info | Log level |
//! | `CLINIX_REQUEST_TIMEOUT` | 30s | Per-request timeout |
//! | `CLINIX_IDLE_THRESHOLD` | 10m | Idle time before a tenant connection is evicted |
//! | `CLINIX_IDLE_EVICTION_INTERVAL` | 1m | Interval between idle sweeps |
//! | `CLINIX_CONNECTION_OPEN_TIMEOUT` | 5s | Bound on opening one tenant connection |
//! | `CLINIX_DIRECTORY_TIMEOUT` | 3s | Bound on one organization lookup |
//! | `CLINIX_MAX_RETRY_BACKOFF` | 30s | Cap on retry backoff after failed opens |
//! | `CLINIX_DIRECTORY_CACHE_TTL` | 30s | Reuse window for fetched organization records |
//! | `CLINIX_SHUTDOWN_GRACE` | 10s | Grace for in-flight operations at shutdown |
//!
//! # Example
//!
//! ```rust
//! use clinix_rest::ServerConfig;
//!
//! // Create from environment
//! let config = ServerConfig::from_env();
//!
//! // Or create programmatically
//! let config = ServerConfig {
//!     base_domain: "clinix.health".to_string(),
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use clap::Parser;
use clinix_tenancy::config::TenancyConfig;
use clinix_tenancy::directory::ConnectionCredentials;

/// Configuration for the tenant gateway.
///
/// Constructed from environment variables with [`ServerConfig::from_env`],
/// from command line arguments with [`ServerConfig::parse`], or
/// programmatically.
#[derive(Debug, Clone, Parser)]
#[command(name = "clinix-gateway")]
#[command(about = "Clinix tenant gateway")]
pub struct ServerConfig {
    /// Base domain whose subdomains identify tenants.
    #[arg(long, env = "CLINIX_BASE_DOMAIN", default_value = "localhost")]
    pub base_domain: String,

    /// Connection URI for the default/global database (root-domain traffic).
    #[arg(
        long,
        env = "CLINIX_DEFAULT_DATABASE_URI",
        default_value = "memory://localhost"
    )]
    pub default_database_uri: String,

    /// Name of the default/global database.
    #[arg(long, env = "CLINIX_DEFAULT_DATABASE_NAME", default_value = "clinix")]
    pub default_database_name: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "CLINIX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Per-request timeout.
    #[arg(
        long,
        env = "CLINIX_REQUEST_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub request_timeout: Duration,

    /// Idle time before a tenant connection is evicted.
    #[arg(
        long,
        env = "CLINIX_IDLE_THRESHOLD",
        default_value = "10m",
        value_parser = humantime::parse_duration
    )]
    pub idle_threshold: Duration,

    /// Interval between idle sweeps.
    #[arg(
        long,
        env = "CLINIX_IDLE_EVICTION_INTERVAL",
        default_value = "1m",
        value_parser = humantime::parse_duration
    )]
    pub idle_eviction_interval: Duration,

    /// Bound on opening one tenant connection.
    #[arg(
        long,
        env = "CLINIX_CONNECTION_OPEN_TIMEOUT",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub connection_open_timeout: Duration,

    /// Bound on one organization-directory lookup.
    #[arg(
        long,
        env = "CLINIX_DIRECTORY_TIMEOUT",
        default_value = "3s",
        value_parser = humantime::parse_duration
    )]
    pub directory_timeout: Duration,

    /// Cap on the retry backoff after failed connection opens.
    #[arg(
        long,
        env = "CLINIX_MAX_RETRY_BACKOFF",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub max_retry_backoff: Duration,

    /// Reuse window for fetched organization records.
    #[arg(
        long,
        env = "CLINIX_DIRECTORY_CACHE_TTL",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub directory_cache_ttl: Duration,

    /// Grace period for in-flight operations at shutdown.
    #[arg(
        long,
        env = "CLINIX_SHUTDOWN_GRACE",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_domain: "localhost".to_string(),
            default_database_uri: "memory://localhost".to_string(),
            default_database_name: "clinix".to_string(),
            log_level: "info".to_string(),
            request_timeout: Duration::from_secs(30),
            idle_threshold: Duration::from_secs(600),
            idle_eviction_interval: Duration::from_secs(60),
            connection_open_timeout: Duration::from_secs(5),
            directory_timeout: Duration::from_secs(3),
            max_retry_backoff: Duration::from_secs(30),
            directory_cache_ttl: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Creates a ServerConfig from environment variables.
    ///
    /// Parses the environment without requiring command line arguments,
    /// falling back to defaults on parse failure.
    pub fn from_env() -> Self {
        Self::try_parse().unwrap_or_default()
    }

    /// Validates the configuration and returns the collected errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.base_domain.trim().is_empty() {
            errors.push("Base domain cannot be empty".to_string());
        }
        if self.base_domain.contains('/') || self.base_domain.contains("://") {
            errors.push("Base domain must be a bare hostname, not a URL".to_string());
        }
        if self.idle_threshold.is_zero() {
            errors.push("Idle threshold cannot be zero".to_string());
        }
        if self.idle_eviction_interval.is_zero() {
            errors.push("Idle eviction interval cannot be zero".to_string());
        }
        if self.connection_open_timeout.is_zero() {
            errors.push("Connection open timeout cannot be zero".to_string());
        }
        if self.request_timeout.is_zero() {
            errors.push("Request timeout cannot be zero".to_string());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Builds the core tenancy configuration from this server configuration.
    pub fn tenancy_config(&self) -> TenancyConfig {
        TenancyConfig::new()
            .with_idle_threshold_secs(self.idle_threshold.as_secs())
            .with_idle_eviction_interval_secs(self.idle_eviction_interval.as_secs().max(1))
            .with_connection_open_timeout_ms(self.connection_open_timeout.as_millis() as u64)
            .with_directory_timeout_ms(self.directory_timeout.as_millis() as u64)
            .with_max_retry_backoff_ms(self.max_retry_backoff.as_millis() as u64)
            .with_directory_cache_ttl_secs(self.directory_cache_ttl.as_secs())
            .with_shutdown_grace_ms(self.shutdown_grace.as_millis() as u64)
            .with_default_credentials(ConnectionCredentials::new(
                &self.default_database_uri,
                &self.default_database_name,
            ))
    }

    /// Creates a configuration suitable for testing.
    ///
    /// Short timeouts, an example base domain, and debug logging.
    pub fn for_testing() -> Self {
        Self {
            base_domain: "example.com".to_string(),
            default_database_uri: "memory://localhost".to_string(),
            default_database_name: "clinix-test".to_string(),
            log_level: "debug".to_string(),
            request_timeout: Duration::from_secs(5),
            idle_threshold: Duration::from_secs(60),
            idle_eviction_interval: Duration::from_secs(5),
            connection_open_timeout: Duration::from_secs(1),
            directory_timeout: Duration::from_secs(1),
            max_retry_backoff: Duration::from_secs(2),
            directory_cache_ttl: Duration::from_secs(1),
            shutdown_grace: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.base_domain, "localhost");
        assert_eq!(config.idle_threshold, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_base_domain() {
        let config = ServerConfig {
            base_domain: "  ".to_string(),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("Base domain")));
    }

    #[test]
    fn test_validate_url_base_domain() {
        let config = ServerConfig {
            base_domain: "https://clinix.health".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_durations() {
        let config = ServerConfig {
            idle_threshold: Duration::ZERO,
            idle_eviction_interval: Duration::ZERO,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_tenancy_config_conversion() {
        let config = ServerConfig {
            idle_threshold: Duration::from_secs(120),
            connection_open_timeout: Duration::from_millis(1_500),
            default_database_uri: "memory://test".to_string(),
            default_database_name: "root_db".to_string(),
            ..Default::default()
        };

        let tenancy = config.tenancy_config();
        assert_eq!(tenancy.idle_threshold_secs, 120);
        assert_eq!(tenancy.connection_open_timeout_ms, 1_500);
        assert_eq!(tenancy.default_credentials.database, "root_db");
    }

    #[test]
    fn test_for_testing() {
        let config = ServerConfig::for_testing();
        assert_eq!(config.base_domain, "example.com");
        assert!(config.validate().is_ok());
    }
}
