//! Repository port for the connection registry.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    entity::{Connection, ConnectionStats},
    value_object::{ConnectionId, TenantId, UserId},
};

/// Registry of live connections keyed by (tenant, user).
///
/// At most one connection exists per key. Implementations must be safe under
/// unbounded concurrent callers and must never hold their lock across I/O.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Insert a connection, replacing any entry under the same key.
    ///
    /// Returns the replaced connection so the caller can close it.
    async fn register(&self, connection: Arc<Connection>) -> Option<Arc<Connection>>;

    /// Remove whatever connection is stored under the key
    async fn unregister(&self, tenant_id: TenantId, user_id: UserId) -> Option<Arc<Connection>>;

    /// Remove the entry only if it still holds `connection_id`.
    ///
    /// A read loop that outlived a reconnect must not evict its successor.
    async fn unregister_connection(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<Arc<Connection>>;

    async fn get(&self, tenant_id: TenantId, user_id: UserId) -> Option<Arc<Connection>>;

    /// Connected user ids of a tenant, in ascending order
    async fn list_users(&self, tenant_id: TenantId) -> Vec<UserId>;

    /// All connections of a tenant
    async fn connections_in(&self, tenant_id: TenantId) -> Vec<Arc<Connection>>;

    /// Every connection across all tenants
    async fn all_connections(&self) -> Vec<Arc<Connection>>;

    async fn snapshot(&self) -> ConnectionStats;

    /// Remove and return every connection
    async fn drain(&self) -> Vec<Arc<Connection>>;
}
