//! # clinix-rest - Tenant Gateway
//!
//! This crate is the HTTP-facing slice of the Clinix tenancy layer. It turns
//! an inbound request into a ready, tenant-scoped data-access handle:
//!
//! 1. The [`TenantResolver`](tenant::TenantResolver) derives a tenant key
//!    from the request's `Host` header (`clinic-a.example.com` resolves to
//!    tenant `clinic-a`; the bare base domain routes to the root tenant).
//! 2. The [`TenantGateway`](extractors::TenantGateway) extractor fetches a
//!    handle from the connection cache, opening the tenant's connection
//!    lazily on first use.
//! 3. Tenancy failures map onto the HTTP statuses the application layer
//!    presents: 404 for unknown tenants, 403 for deactivated ones, 503 with
//!    `Retry-After` for transient connection trouble.
//!
//! Route handlers, domain entities, and rendering belong to the consuming
//! application; this crate deliberately exposes only the gateway surface.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use axum::{Json, Router, routing::get};
//! use clinix_rest::extractors::TenantGateway;
//! use clinix_rest::{AppState, ServerConfig, create_app, init_logging};
//! use clinix_tenancy::cache::ConnectionCache;
//! use clinix_tenancy::factory::ConnectionFactory;
//! use clinix_tenancy::supervisor::LifecycleSupervisor;
//! use serde_json::{Value, json};
//!
//! async fn list_patients(gateway: TenantGateway) -> Json<Value> {
//!     let patients = gateway.handle().find("patients", json!({})).await.unwrap();
//!     Json(json!({ "patients": patients }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env();
//!     init_logging(&config.log_level);
//!
//!     let tenancy = config.tenancy_config();
//!     let factory = ConnectionFactory::new(directory, connector, tenancy.clone());
//!     let cache = Arc::new(ConnectionCache::new(factory, tenancy.clone()));
//!     let supervisor = LifecycleSupervisor::spawn(Arc::clone(&cache), tenancy);
//!
//!     let state = AppState::new(cache, config);
//!     let routes = Router::new().route("/patients", get(list_patients));
//!     let app = create_app(state, routes);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     supervisor.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`tenant`] - Host-header tenant resolution
//! - [`extractors`] - The `TenantGateway` request extractor
//! - [`state`] - Application state (cache, resolver, configuration)
//! - [`error`] - Error types and HTTP status mapping
//! - [`config`] - Server configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod state;
pub mod tenant;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{RestError, RestResult};
pub use state::AppState;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Assembles the gateway application around the consumer's routes.
///
/// Adds the `/healthz` endpoint and the standard middleware stack (request
/// tracing and a per-request timeout from the configuration). The given
/// routes receive the [`AppState`] and can use the
/// [`TenantGateway`](extractors::TenantGateway) extractor.
pub fn create_app(state: AppState, routes: Router<AppState>) -> Router {
    info!(
        base_domain = state.config().base_domain,
        "creating tenant gateway"
    );
    let request_timeout = state.config().request_timeout;

    let router = Router::new()
        .route("/healthz", get(health))
        .merge(routes)
        .with_state(state);

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                request_timeout,
            )),
    )
}

/// Liveness endpoint reporting cache occupancy and activity counters.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "up",
        "tenancy": {
            "cached_connections": state.cache().size(),
            "stats": state.cache().stats(),
        },
    }))
}

/// Initializes the tracing subscriber for logging.
///
/// Call once at application startup.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "clinix_rest={level},clinix_tenancy={level},tower_http=debug"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
