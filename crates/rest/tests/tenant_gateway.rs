//! End-to-end tests for host-based tenant routing.
//!
//! Each test drives a real Axum application through `TestServer`: the `Host`
//! header picks the tenant, the gateway extractor yields a scoped handle,
//! and tenancy failures surface as the documented HTTP statuses.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderValue, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_test::TestServer;
use serde_json::{Value, json};

use clinix_rest::extractors::TenantGateway;
use clinix_rest::{AppState, RestError, ServerConfig, create_app};
use clinix_tenancy::backends::DataConnection;
use clinix_tenancy::backends::memory::MemoryConnector;
use clinix_tenancy::cache::ConnectionCache;
use clinix_tenancy::directory::{
    ConnectionCredentials, OrganizationRecord, StaticDirectory,
};
use clinix_tenancy::error::{TenancyError, TenancyResult};
use clinix_tenancy::factory::{ConnectionFactory, Connector};
use clinix_tenancy::tenant::TenantKey;

fn key(s: &str) -> TenantKey {
    TenantKey::parse(s).expect("test tenant key must be valid")
}

fn organization(tenant: &str) -> OrganizationRecord {
    OrganizationRecord::new(
        key(tenant),
        tenant.to_string(),
        ConnectionCredentials::new("memory://localhost", format!("{}_db", tenant)),
    )
}

/// Connector that refuses every handshake, simulating an unreachable
/// tenant database.
struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(
        &self,
        key: &TenantKey,
        _credentials: &ConnectionCredentials,
    ) -> TenancyResult<Arc<dyn DataConnection>> {
        Err(TenancyError::ConnectionRefused {
            tenant: key.clone(),
            message: "database unreachable".to_string(),
        })
    }
}

async fn whoami(gateway: TenantGateway) -> Json<Value> {
    Json(json!({
        "tenant": gateway.tenant().as_str(),
        "source": gateway.source().to_string(),
    }))
}

async fn create_patient(
    gateway: TenantGateway,
    Json(body): Json<Value>,
) -> Result<Json<Value>, RestError> {
    let id = gateway.handle().insert("patients", body).await?;
    Ok(Json(json!({ "id": id })))
}

async fn list_patients(gateway: TenantGateway) -> Result<Json<Value>, RestError> {
    let patients = gateway.handle().find("patients", json!({})).await?;
    Ok(Json(json!({ "patients": patients })))
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/whoami", get(whoami))
        .route("/patients", post(create_patient))
        .route("/patients", get(list_patients))
}

fn server_with(directory: StaticDirectory, connector: Arc<dyn Connector>) -> TestServer {
    let config = ServerConfig::for_testing();
    let tenancy = config.tenancy_config();
    let factory = ConnectionFactory::new(Arc::new(directory), connector, tenancy.clone());
    let state = AppState::new(Arc::new(ConnectionCache::new(factory, tenancy)), config);
    let app = create_app(state, routes());
    TestServer::new(app).expect("failed to create test server")
}

fn host(value: &'static str) -> HeaderValue {
    HeaderValue::from_static(value)
}

#[tokio::test]
async fn test_subdomain_routes_to_tenant() {
    let server = server_with(
        StaticDirectory::new().with_organization(organization("clinic-a")),
        Arc::new(MemoryConnector::new()),
    );

    let response = server
        .get("/whoami")
        .add_header(header::HOST, host("clinic-a.example.com"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["tenant"], "clinic-a");
    assert_eq!(body["source"], "subdomain");
}

#[tokio::test]
async fn test_base_domain_routes_to_root_tenant() {
    let server = server_with(StaticDirectory::new(), Arc::new(MemoryConnector::new()));

    let response = server
        .get("/whoami")
        .add_header(header::HOST, host("example.com"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["tenant"], "__root__");
    assert_eq!(body["source"], "fallback");
}

#[tokio::test]
async fn test_data_stays_inside_the_tenant() {
    let server = server_with(
        StaticDirectory::new()
            .with_organization(organization("clinic-a"))
            .with_organization(organization("clinic-b")),
        Arc::new(MemoryConnector::new()),
    );

    let response = server
        .post("/patients")
        .add_header(header::HOST, host("clinic-a.example.com"))
        .json(&json!({ "name": "Ada Lovelace" }))
        .await;
    response.assert_status_ok();

    // The other clinic sees nothing.
    let response = server
        .get("/patients")
        .add_header(header::HOST, host("clinic-b.example.com"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["patients"].as_array().unwrap().len(), 0);

    // The originating clinic sees its own record.
    let response = server
        .get("/patients")
        .add_header(header::HOST, host("clinic-a.example.com"))
        .await;
    let body: Value = response.json();
    assert_eq!(body["patients"].as_array().unwrap().len(), 1);
    assert_eq!(body["patients"][0]["name"], "Ada Lovelace");
}

#[tokio::test]
async fn test_unknown_tenant_is_404() {
    let server = server_with(StaticDirectory::new(), Arc::new(MemoryConnector::new()));

    let response = server
        .get("/patients")
        .add_header(header::HOST, host("clinic-x.example.com"))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "unknown-tenant");
}

#[tokio::test]
async fn test_inactive_tenant_is_403() {
    let server = server_with(
        StaticDirectory::new().with_organization(organization("clinic-b").deactivated()),
        Arc::new(MemoryConnector::new()),
    );

    let response = server
        .get("/patients")
        .add_header(header::HOST, host("clinic-b.example.com"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"], "tenant-inactive");
}

#[tokio::test]
async fn test_unreachable_database_is_503_with_retry_guidance() {
    let server = server_with(
        StaticDirectory::new().with_organization(organization("clinic-a")),
        Arc::new(RefusingConnector),
    );

    let response = server
        .get("/patients")
        .add_header(header::HOST, host("clinic-a.example.com"))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body: Value = response.json();
    assert_eq!(body["error"], "unavailable");
}

#[tokio::test]
async fn test_healthz_reports_cache_state() {
    let server = server_with(
        StaticDirectory::new().with_organization(organization("clinic-a")),
        Arc::new(MemoryConnector::new()),
    );

    // Warm one tenant so the counters move.
    server
        .get("/whoami")
        .add_header(header::HOST, host("clinic-a.example.com"))
        .await
        .assert_status_ok();

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "up");
    assert_eq!(body["tenancy"]["cached_connections"], 1);
    assert_eq!(body["tenancy"]["stats"]["creations"], 1);
}
