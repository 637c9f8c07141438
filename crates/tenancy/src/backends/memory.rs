//! In-memory backend.
//!
//! Stores collections as plain JSON documents inside the process. The
//! connector keeps one store per logical database name, so a tenant that is
//! evicted and later re-opened sees its previous data, matching how a real
//! database behaves across connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::DataConnection;
use crate::directory::ConnectionCredentials;
use crate::error::{TenancyError, TenancyResult};
use crate::factory::Connector;
use crate::tenant::TenantKey;

/// Collections of one logical database, shared between connections.
type SharedStore = Arc<RwLock<HashMap<String, Vec<Value>>>>;

/// Connector that hands out in-memory connections.
///
/// `memory://` URIs are accepted as-is; the credentials' database name selects
/// the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    databases: Arc<RwLock<HashMap<String, SharedStore>>>,
}

impl MemoryConnector {
    /// Creates a connector with no databases yet.
    pub fn new() -> Self {
        Self::default()
    }

    fn store_for(&self, database: &str) -> SharedStore {
        let mut databases = self.databases.write();
        databases
            .entry(database.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(HashMap::new())))
            .clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        key: &TenantKey,
        credentials: &ConnectionCredentials,
    ) -> TenancyResult<Arc<dyn DataConnection>> {
        Ok(Arc::new(MemoryConnection {
            tenant: key.clone(),
            store: self.store_for(&credentials.database),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A connection to one in-memory logical database.
#[derive(Debug)]
pub struct MemoryConnection {
    tenant: TenantKey,
    store: SharedStore,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn check_open(&self) -> TenancyResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(TenancyError::ConnectionClosed {
                tenant: self.tenant.clone(),
            })
        } else {
            Ok(())
        }
    }
}

/// Returns `true` when every field of `filter` equals the corresponding
/// document field. An empty filter matches every document.
fn matches(document: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

fn as_object(value: Value, what: &str) -> TenancyResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TenancyError::Backend {
            message: format!("{} must be a JSON object, got {}", what, json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl DataConnection for MemoryConnection {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, collection: &str, filter: Value) -> TenancyResult<Vec<Value>> {
        self.check_open()?;
        let filter = as_object(filter, "filter")?;
        let store = self.store.read();
        Ok(store
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|doc| matches(doc, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: Value) -> TenancyResult<Option<Value>> {
        self.check_open()?;
        let filter = as_object(filter, "filter")?;
        let store = self.store.read();
        Ok(store
            .get(collection)
            .and_then(|documents| documents.iter().find(|doc| matches(doc, &filter)).cloned()))
    }

    async fn insert(&self, collection: &str, document: Value) -> TenancyResult<String> {
        self.check_open()?;
        let mut document = as_object(document, "document")?;
        let id = match document.get("_id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(TenancyError::Backend {
                    message: format!("_id must be a string, got {}", json_kind(other)),
                });
            }
            None => {
                let id = Uuid::new_v4().to_string();
                document.insert("_id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut store = self.store.write();
        store
            .entry(collection.to_string())
            .or_default()
            .push(Value::Object(document));
        Ok(id)
    }

    async fn update(&self, collection: &str, filter: Value, changes: Value) -> TenancyResult<u64> {
        self.check_open()?;
        let filter = as_object(filter, "filter")?;
        let changes = as_object(changes, "changes")?;

        let mut store = self.store.write();
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut modified = 0;
        for document in documents.iter_mut() {
            if matches(document, &filter) {
                if let Value::Object(fields) = document {
                    for (field, value) in &changes {
                        fields.insert(field.clone(), value.clone());
                    }
                    modified += 1;
                }
            }
        }
        Ok(modified)
    }

    async fn delete(&self, collection: &str, filter: Value) -> TenancyResult<u64> {
        self.check_open()?;
        let filter = as_object(filter, "filter")?;

        let mut store = self.store.write();
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let before = documents.len();
        documents.retain(|doc| !matches(doc, &filter));
        Ok((before - documents.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: Value) -> TenancyResult<u64> {
        self.check_open()?;
        let filter = as_object(filter, "filter")?;
        let store = self.store.read();
        Ok(store
            .get(collection)
            .map(|documents| documents.iter().filter(|doc| matches(doc, &filter)).count())
            .unwrap_or(0) as u64)
    }

    async fn ping(&self) -> TenancyResult<()> {
        self.check_open()
    }

    async fn close(&self) -> TenancyResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
