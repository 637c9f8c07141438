//! MongoDB backend, enabled with the `mongodb` feature.
//!
//! Each tenant connection wraps a [`mongodb::Database`] handle scoped to the
//! organization's logical database. The driver connects lazily, so the
//! factory's post-open ping is what actually establishes the first socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use serde_json::Value;

use super::DataConnection;
use crate::directory::ConnectionCredentials;
use crate::error::{TenancyError, TenancyResult};
use crate::factory::Connector;
use crate::tenant::TenantKey;

/// Connector that opens MongoDB clients from organization credentials.
#[derive(Debug, Clone, Default)]
pub struct MongoConnector {
    connect_timeout: Option<Duration>,
}

impl MongoConnector {
    /// Creates a connector with driver-default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the driver's own connect and server-selection phases.
    ///
    /// The factory applies the overall open timeout regardless; this keeps
    /// the driver from retrying server selection past that point.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(
        &self,
        key: &TenantKey,
        credentials: &ConnectionCredentials,
    ) -> TenancyResult<Arc<dyn DataConnection>> {
        let mut options = ClientOptions::parse(&credentials.uri).await.map_err(|err| {
            TenancyError::ConnectionRefused {
                tenant: key.clone(),
                message: err.to_string(),
            }
        })?;
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = Some(timeout);
            options.server_selection_timeout = Some(timeout);
        }
        options.app_name.get_or_insert_with(|| "clinix".to_string());

        let client = Client::with_options(options).map_err(|err| {
            TenancyError::ConnectionRefused {
                tenant: key.clone(),
                message: err.to_string(),
            }
        })?;
        let database = client.database(&credentials.database);

        Ok(Arc::new(MongoConnection {
            tenant: key.clone(),
            client,
            database,
            closed: AtomicBool::new(false),
        }))
    }
}

/// A connection to one tenant's MongoDB database.
pub struct MongoConnection {
    tenant: TenantKey,
    client: Client,
    database: Database,
    closed: AtomicBool,
}

impl MongoConnection {
    fn check_open(&self) -> TenancyResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(TenancyError::ConnectionClosed {
                tenant: self.tenant.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

fn to_document(value: &Value, what: &str) -> TenancyResult<Document> {
    if !value.is_object() {
        return Err(TenancyError::Backend {
            message: format!("{} must be a JSON object", what),
        });
    }
    mongodb::bson::to_document(value).map_err(|err| TenancyError::Backend {
        message: format!("failed to convert {}: {}", what, err),
    })
}

fn to_value(document: Document) -> TenancyResult<Value> {
    serde_json::to_value(document).map_err(TenancyError::from)
}

fn driver_error(err: mongodb::error::Error) -> TenancyError {
    TenancyError::Backend {
        message: err.to_string(),
    }
}

#[async_trait]
impl DataConnection for MongoConnection {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn find(&self, collection: &str, filter: Value) -> TenancyResult<Vec<Value>> {
        self.check_open()?;
        let filter = to_document(&filter, "filter")?;
        let mut cursor = self
            .collection(collection)
            .find(filter)
            .await
            .map_err(driver_error)?;

        let mut results = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(driver_error)? {
            results.push(to_value(document)?);
        }
        Ok(results)
    }

    async fn find_one(&self, collection: &str, filter: Value) -> TenancyResult<Option<Value>> {
        self.check_open()?;
        let filter = to_document(&filter, "filter")?;
        let document = self
            .collection(collection)
            .find_one(filter)
            .await
            .map_err(driver_error)?;
        document.map(to_value).transpose()
    }

    async fn insert(&self, collection: &str, document: Value) -> TenancyResult<String> {
        self.check_open()?;
        let document = to_document(&document, "document")?;
        let result = self
            .collection(collection)
            .insert_one(document)
            .await
            .map_err(driver_error)?;

        Ok(match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::String(id) => id,
            other => other.to_string(),
        })
    }

    async fn update(&self, collection: &str, filter: Value, changes: Value) -> TenancyResult<u64> {
        self.check_open()?;
        let filter = to_document(&filter, "filter")?;
        let changes = to_document(&changes, "changes")?;
        let result = self
            .collection(collection)
            .update_many(filter, doc! { "$set": changes })
            .await
            .map_err(driver_error)?;
        Ok(result.modified_count)
    }

    async fn delete(&self, collection: &str, filter: Value) -> TenancyResult<u64> {
        self.check_open()?;
        let filter = to_document(&filter, "filter")?;
        let result = self
            .collection(collection)
            .delete_many(filter)
            .await
            .map_err(driver_error)?;
        Ok(result.deleted_count)
    }

    async fn count(&self, collection: &str, filter: Value) -> TenancyResult<u64> {
        self.check_open()?;
        let filter = to_document(&filter, "filter")?;
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(driver_error)
    }

    async fn ping(&self) -> TenancyResult<()> {
        self.check_open()?;
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(driver_error)?;
        Ok(())
    }

    async fn close(&self) -> TenancyResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Client::shutdown consumes self; the client is internally
        // reference-counted, so shutting down a clone drains the shared state.
        self.client.clone().shutdown().await;
        Ok(())
    }
}
