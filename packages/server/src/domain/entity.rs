//! Core domain models for the notification hub.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{
    error::SinkError,
    sink::ConnectionSink,
    value_object::{ConnectionId, TenantId, UserId},
};

/// Default number of consecutive write failures after which a connection is dead
pub const DEFAULT_MAX_WRITE_FAILURES: u32 = 3;

/// A live socket mapped to exactly one (tenant, user) pair
pub struct Connection {
    id: ConnectionId,
    tenant_id: TenantId,
    user_id: UserId,
    connected_at: DateTime<Utc>,
    sink: Arc<dyn ConnectionSink>,
    /// Reset to zero by every successful write
    consecutive_write_failures: AtomicU32,
    /// Cancelled by `close()`; ends the read side of the socket
    closed: CancellationToken,
}

impl Connection {
    /// Create a new connection that was established just now
    pub fn new(tenant_id: TenantId, user_id: UserId, sink: Arc<dyn ConnectionSink>) -> Self {
        Self {
            id: ConnectionId::generate(),
            tenant_id,
            user_id,
            connected_at: Utc::now(),
            sink,
            consecutive_write_failures: AtomicU32::new(0),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Write a pre-encoded text frame to the socket
    pub async fn send_text(&self, payload: Arc<str>) -> Result<(), SinkError> {
        self.sink.send_text(payload).await
    }

    /// Write a protocol ping frame to the socket
    pub async fn ping(&self) -> Result<(), SinkError> {
        self.sink.send_ping().await
    }

    /// Close the socket.
    ///
    /// Marks the connection closed first, so its read loop ends even if the
    /// peer never answers the close frame.
    pub async fn close(&self) -> Result<(), SinkError> {
        self.closed.cancel();
        self.sink.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once `close()` has been called
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Record a failed write and return the new consecutive failure count
    pub fn record_write_failure(&self) -> u32 {
        self.consecutive_write_failures
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1)
    }

    /// Record a successful write
    pub fn record_write_success(&self) {
        self.consecutive_write_failures.store(0, Ordering::Release);
    }

    /// Current consecutive write failure count
    pub fn write_failures(&self) -> u32 {
        self.consecutive_write_failures.load(Ordering::Acquire)
    }

    /// Health derived from the consecutive write failure count
    pub fn health(&self, max_write_failures: u32) -> ConnectionHealth {
        ConnectionHealth::from_failures(self.write_failures(), max_write_failures)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("user_id", &self.user_id)
            .field("connected_at", &self.connected_at)
            .field("write_failures", &self.write_failures())
            .finish()
    }
}

/// Write-path health of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionHealth {
    /// Last write succeeded (or nothing written yet)
    Active,
    /// Some consecutive writes failed, still below the eviction threshold
    Suspect,
    /// Reached the eviction threshold
    Dead,
}

impl ConnectionHealth {
    pub fn from_failures(failures: u32, max_write_failures: u32) -> Self {
        match failures {
            0 => Self::Active,
            n if n >= max_write_failures.max(1) => Self::Dead,
            _ => Self::Suspect,
        }
    }
}

/// Read-only aggregate of the registry, computed at call time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub tenant_count: usize,
    pub per_tenant_counts: BTreeMap<TenantId, usize>,
}

/// Notification content supplied by the notification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub body: String,
    /// e.g. "announcement", "grade", "fee", "forum"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn default_priority() -> String {
    "normal".to_string()
}
