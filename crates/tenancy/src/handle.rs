//! Tenant-scoped data access handle.
//!
//! A [`TenantHandle`] is the facade request-handling code works with. It is
//! bound at construction to exactly one tenant's connection, so every
//! operation issued through it is implicitly scoped to that tenant's data;
//! there is no way to address another tenant through a handle.
//!
//! Handles are issued only by the connection cache and are meant to live for
//! one request. They expose the generic document primitives of
//! [`DataConnection`](crate::backends::DataConnection) and nothing
//! domain-specific.

use serde_json::Value;
use uuid::Uuid;

use std::sync::Arc;

use crate::connection::{ConnectionState, TenantConnection};
use crate::error::TenancyResult;
use crate::tenant::TenantKey;

/// Data-access facade bound to one tenant's connection.
///
/// Each operation refreshes the connection's last-used timestamp and holds an
/// in-flight marker for its duration, which keeps the lifecycle supervisor
/// from evicting a connection mid-operation. If the connection was closed by
/// invalidation or shutdown, operations fail with
/// [`TenancyError::ConnectionClosed`](crate::error::TenancyError::ConnectionClosed).
#[derive(Clone)]
pub struct TenantHandle {
    connection: Arc<TenantConnection>,
}

impl TenantHandle {
    pub(crate) fn new(connection: Arc<TenantConnection>) -> Self {
        Self { connection }
    }

    /// The tenant this handle is scoped to.
    pub fn tenant(&self) -> &TenantKey {
        self.connection.tenant()
    }

    /// Identity of the underlying connection instance.
    pub fn connection_id(&self) -> Uuid {
        self.connection.id()
    }

    /// Lifecycle state of the underlying connection.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Returns all documents in `collection` matching `filter`.
    pub async fn find(&self, collection: &str, filter: Value) -> TenancyResult<Vec<Value>> {
        let _op = self.connection.begin_op()?;
        self.connection.data().find(collection, filter).await
    }

    /// Returns the first document in `collection` matching `filter`.
    pub async fn find_one(&self, collection: &str, filter: Value) -> TenancyResult<Option<Value>> {
        let _op = self.connection.begin_op()?;
        self.connection.data().find_one(collection, filter).await
    }

    /// Inserts a document into `collection`, returning its id.
    pub async fn insert(&self, collection: &str, document: Value) -> TenancyResult<String> {
        let _op = self.connection.begin_op()?;
        self.connection.data().insert(collection, document).await
    }

    /// Applies `changes` to every document matching `filter`, returning the
    /// number modified.
    pub async fn update(
        &self,
        collection: &str,
        filter: Value,
        changes: Value,
    ) -> TenancyResult<u64> {
        let _op = self.connection.begin_op()?;
        self.connection
            .data()
            .update(collection, filter, changes)
            .await
    }

    /// Deletes every document matching `filter`, returning the number
    /// removed.
    pub async fn delete(&self, collection: &str, filter: Value) -> TenancyResult<u64> {
        let _op = self.connection.begin_op()?;
        self.connection.data().delete(collection, filter).await
    }

    /// Counts documents matching `filter`.
    pub async fn count(&self, collection: &str, filter: Value) -> TenancyResult<u64> {
        let _op = self.connection.begin_op()?;
        self.connection.data().count(collection, filter).await
    }

    /// Verifies the underlying connection is usable.
    pub async fn ping(&self) -> TenancyResult<()> {
        let _op = self.connection.begin_op()?;
        self.connection.data().ping().await
    }
}

impl std::fmt::Debug for TenantHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantHandle")
            .field("tenant", self.tenant())
            .field("connection_id", &self.connection_id())
            .field("state", &self.state())
            .finish()
    }
}
