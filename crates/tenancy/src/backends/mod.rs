//! Tenant database backends.
//!
//! A backend implements [`DataConnection`]: the generic document primitives
//! the tenant-scoped handle exposes. Backends know nothing about appointments,
//! patients, or any other domain entity; domain logic lives entirely in the
//! consuming application layer.
//!
//! Available backends:
//!
//! - [`memory`] (always compiled): in-process store, used by tests and
//!   development.
//! - [`mongodb`] (feature `mongodb`): the production document database.

pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongodb;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TenancyResult;

/// One live, tenant-scoped logical database connection.
///
/// Every operation addresses a named collection within the single logical
/// database the connection was opened against; there is no way to reach
/// another tenant's data through it.
///
/// Filters are JSON objects matched field-by-field against stored documents;
/// an empty object matches everything. Update changes are JSON objects whose
/// fields are written over the matched documents.
#[async_trait]
pub trait DataConnection: Send + Sync {
    /// Human-readable backend name, for logs.
    fn backend_name(&self) -> &'static str;

    /// Returns all documents in `collection` matching `filter`.
    async fn find(&self, collection: &str, filter: Value) -> TenancyResult<Vec<Value>>;

    /// Returns the first document in `collection` matching `filter`.
    async fn find_one(&self, collection: &str, filter: Value) -> TenancyResult<Option<Value>>;

    /// Inserts a document into `collection`, returning its id.
    ///
    /// A missing `_id` field is assigned by the backend.
    async fn insert(&self, collection: &str, document: Value) -> TenancyResult<String>;

    /// Applies `changes` to every document matching `filter`, returning the
    /// number of documents modified.
    async fn update(&self, collection: &str, filter: Value, changes: Value) -> TenancyResult<u64>;

    /// Deletes every document matching `filter`, returning the number removed.
    async fn delete(&self, collection: &str, filter: Value) -> TenancyResult<u64>;

    /// Counts documents matching `filter`.
    async fn count(&self, collection: &str, filter: Value) -> TenancyResult<u64>;

    /// Verifies the connection is usable.
    async fn ping(&self) -> TenancyResult<()>;

    /// Releases the underlying connection.
    ///
    /// After `close` returns, every other method fails. Calling `close` twice
    /// is allowed and the second call is a no-op.
    async fn close(&self) -> TenancyResult<()>;
}
