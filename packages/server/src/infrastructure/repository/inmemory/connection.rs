//! InMemory Connection Repository 実装
//!
//! ドメイン層が定義する ConnectionRepository trait の具体的な実装。
//! tenant id -> (user id -> Connection) の二段 HashMap を RwLock で保護します。
//!
//! 読み取り（ブロードキャスト対象の解決、統計）は共有ロック、
//! register / unregister は排他ロックを取ります。ロックを保持したまま
//! ソケットへの書き込みを行うことはありません（Arc を複製して返すだけ）。

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{
    Connection, ConnectionId, ConnectionRepository, ConnectionStats, TenantId, UserId,
};

type TenantConnections = HashMap<UserId, Arc<Connection>>;

/// インメモリ Connection Repository 実装
#[derive(Default)]
pub struct InMemoryConnectionRepository {
    tenants: RwLock<HashMap<TenantId, TenantConnections>>,
}

impl InMemoryConnectionRepository {
    /// 新しい InMemoryConnectionRepository を作成
    pub fn new() -> Self {
        Self::default()
    }
}

/// Remove `user_id` from the tenant map and drop the tenant once it is empty
fn remove_entry(
    tenants: &mut HashMap<TenantId, TenantConnections>,
    tenant_id: TenantId,
    user_id: UserId,
) -> Option<Arc<Connection>> {
    let users = tenants.get_mut(&tenant_id)?;
    let removed = users.remove(&user_id);
    if users.is_empty() {
        tenants.remove(&tenant_id);
    }
    removed
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn register(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut tenants = self.tenants.write().await;
        tenants
            .entry(connection.tenant_id())
            .or_default()
            .insert(connection.user_id(), connection)
    }

    async fn unregister(&self, tenant_id: TenantId, user_id: UserId) -> Option<Arc<Connection>> {
        let mut tenants = self.tenants.write().await;
        remove_entry(&mut tenants, tenant_id, user_id)
    }

    async fn unregister_connection(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<Arc<Connection>> {
        let mut tenants = self.tenants.write().await;
        let is_current = tenants
            .get(&tenant_id)
            .and_then(|users| users.get(&user_id))
            .is_some_and(|current| current.id() == connection_id);
        if !is_current {
            return None;
        }
        remove_entry(&mut tenants, tenant_id, user_id)
    }

    async fn get(&self, tenant_id: TenantId, user_id: UserId) -> Option<Arc<Connection>> {
        let tenants = self.tenants.read().await;
        tenants
            .get(&tenant_id)
            .and_then(|users| users.get(&user_id))
            .cloned()
    }

    async fn list_users(&self, tenant_id: TenantId) -> Vec<UserId> {
        let tenants = self.tenants.read().await;
        let mut users: Vec<UserId> = tenants
            .get(&tenant_id)
            .map(|users| users.keys().copied().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    async fn connections_in(&self, tenant_id: TenantId) -> Vec<Arc<Connection>> {
        let tenants = self.tenants.read().await;
        tenants
            .get(&tenant_id)
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn all_connections(&self) -> Vec<Arc<Connection>> {
        let tenants = self.tenants.read().await;
        tenants
            .values()
            .flat_map(|users| users.values().cloned())
            .collect()
    }

    async fn snapshot(&self) -> ConnectionStats {
        let tenants = self.tenants.read().await;
        let per_tenant_counts: BTreeMap<TenantId, usize> = tenants
            .iter()
            .map(|(tenant_id, users)| (*tenant_id, users.len()))
            .collect();
        ConnectionStats {
            total_connections: per_tenant_counts.values().sum(),
            tenant_count: per_tenant_counts.len(),
            per_tenant_counts,
        }
    }

    async fn drain(&self) -> Vec<Arc<Connection>> {
        let mut tenants = self.tenants.write().await;
        tenants
            .drain()
            .flat_map(|(_, users)| users.into_values())
            .collect()
    }
}
