//! Live tenant connection state.
//!
//! A [`TenantConnection`] wraps one open [`DataConnection`] together with the
//! lifecycle metadata the cache and supervisor need: creation time, last-used
//! time, state, and the number of operations currently in flight.
//!
//! The connection cache is the sole owner of lifecycle state. Handles and
//! other components only borrow a connection for the duration of a single
//! operation, through [`TenantConnection::begin_op`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::backends::DataConnection;
use crate::error::{TenancyError, TenancyResult};
use crate::tenant::TenantKey;

/// Lifecycle state of a tenant connection.
///
/// Transitions: `Connecting` to `Ready` on a successful open, `Connecting` to
/// `Failed` when the open fails after the transport handshake, and any state
/// to `Closed` on eviction, invalidation, or shutdown. `Closed` is terminal:
/// a closed connection is never reused, a later `get` for the tenant creates
/// a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The open is still in progress.
    Connecting,
    /// The connection is live and may serve operations.
    Ready,
    /// The open failed; the instance is discarded.
    Failed,
    /// The connection has been torn down.
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Ready,
            2 => ConnectionState::Failed,
            _ => ConnectionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Ready => 1,
            ConnectionState::Failed => 2,
            ConnectionState::Closed => 3,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Ready => write!(f, "ready"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// One live data connection plus its lifecycle metadata.
pub struct TenantConnection {
    id: Uuid,
    tenant: TenantKey,
    data: Arc<dyn DataConnection>,
    state: AtomicU8,
    opened_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
    in_flight: AtomicUsize,
}

impl TenantConnection {
    /// Wraps a freshly opened data connection; state starts at `Connecting`
    /// until the factory verifies it and marks it ready.
    pub(crate) fn new(tenant: TenantKey, data: Arc<dyn DataConnection>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant,
            data,
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            opened_at: Utc::now(),
            last_used: Mutex::new(Instant::now()),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Unique identity of this connection instance.
    ///
    /// A tenant that is evicted and re-opened gets a new id, which makes
    /// connection churn visible in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The tenant this connection is scoped to.
    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    /// When the connection was opened (wall clock).
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Time since the connection last served an operation.
    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Name of the backing driver.
    pub fn backend_name(&self) -> &'static str {
        self.data.backend_name()
    }

    pub(crate) fn data(&self) -> &dyn DataConnection {
        self.data.as_ref()
    }

    /// Refreshes the last-used timestamp.
    pub(crate) fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    pub(crate) fn mark_ready(&self) {
        self.transition(ConnectionState::Ready);
    }

    pub(crate) fn mark_failed(&self) {
        self.transition(ConnectionState::Failed);
    }

    pub(crate) fn mark_closed(&self) {
        self.transition(ConnectionState::Closed);
    }

    // Closed is terminal; every other transition is a plain store.
    fn transition(&self, next: ConnectionState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if ConnectionState::from_u8(current) == ConnectionState::Closed {
                    None
                } else {
                    Some(next.as_u8())
                }
            });
    }

    /// Begins one operation against the connection.
    ///
    /// Fails with [`TenancyError::ConnectionClosed`] unless the connection is
    /// `Ready`. On success the last-used timestamp is refreshed and the
    /// in-flight counter is held up until the guard drops.
    pub(crate) fn begin_op(&self) -> TenancyResult<OperationGuard<'_>> {
        if self.state() != ConnectionState::Ready {
            return Err(TenancyError::ConnectionClosed {
                tenant: self.tenant.clone(),
            });
        }
        self.touch();
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(OperationGuard { connection: self })
    }

    /// Closes the underlying data connection.
    pub(crate) async fn close_data(&self) -> TenancyResult<()> {
        self.data.close().await
    }
}

impl fmt::Debug for TenantConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConnection")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .field("backend", &self.data.backend_name())
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// RAII marker for one in-flight operation.
#[derive(Debug)]
pub(crate) struct OperationGuard<'a> {
    connection: &'a TenantConnection,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.connection.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
