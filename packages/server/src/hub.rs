//! Notification hub facade.
//!
//! Composes the connection registry, the broadcast dispatcher and the
//! heartbeat monitor behind one object shared as `Arc<NotificationHub>`.
//! Every broadcast encodes its message once and enqueues one task per target;
//! the call returns as soon as the tasks are queued (or dropped).

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures_util::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::HubConfig,
    domain::{
        Connection, ConnectionRepository, ConnectionSink, ConnectionStats, Notification,
        TenantId, UserId,
    },
    error::HubError,
    infrastructure::{
        dispatcher::{BroadcastTask, DispatchStats, Dispatcher, EnqueueOutcome},
        dto::websocket::WebSocketMessage,
        heartbeat::HeartbeatMonitor,
        repository::InMemoryConnectionRepository,
    },
    usecase::{
        BroadcastTarget, ConnectClientUseCase, DisconnectClientUseCase, ResolveTargetsUseCase,
    },
};

pub struct NotificationHub {
    config: HubConfig,
    repository: Arc<dyn ConnectionRepository>,
    dispatcher: Dispatcher,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
}

impl NotificationHub {
    /// Create a hub backed by the in-memory registry.
    ///
    /// Spawns the dispatch workers and the heartbeat monitor, so it must be
    /// called inside a Tokio runtime.
    pub fn new(config: HubConfig) -> Arc<Self> {
        Self::with_repository(config, Arc::new(InMemoryConnectionRepository::new()))
    }

    pub fn with_repository(
        config: HubConfig,
        repository: Arc<dyn ConnectionRepository>,
    ) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::start(&config, repository.clone(), shutdown.clone());
        let heartbeat = HeartbeatMonitor::new(&config, repository.clone()).spawn(shutdown.clone());

        Arc::new(Self {
            config,
            repository,
            dispatcher,
            heartbeat: Mutex::new(Some(heartbeat)),
            shutdown,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Token cancelled by `stop()`; read loops select on it
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register an upgraded socket for (tenant, user).
    ///
    /// A previous connection under the same key is replaced and closed.
    pub async fn register_connection(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        sink: Arc<dyn ConnectionSink>,
    ) -> Result<Arc<Connection>, HubError> {
        self.ensure_running()?;

        let connection = ConnectClientUseCase::new(self.repository.clone())
            .execute(tenant_id, user_id, sink)
            .await;

        // stop() may have drained the registry between the check and the insert
        if self.is_stopped() {
            self.release_connection(&connection).await;
            return Err(HubError::Stopped);
        }

        tracing::info!(
            college_id = %tenant_id,
            user_id = %user_id,
            connection_id = %connection.id(),
            "Client connected"
        );
        Ok(connection)
    }

    /// Cleanup for a connection whose read loop ended. Safe to call repeatedly.
    pub async fn release_connection(&self, connection: &Connection) {
        let removed = DisconnectClientUseCase::new(self.repository.clone())
            .execute(connection)
            .await;
        if removed {
            tracing::info!(
                college_id = %connection.tenant_id(),
                user_id = %connection.user_id(),
                connection_id = %connection.id(),
                "Client disconnected"
            );
        }
    }

    /// Push a notification to every connection of the tenant
    pub async fn broadcast_notification(
        &self,
        tenant_id: TenantId,
        notification: &Notification,
    ) -> Result<(), HubError> {
        self.broadcast(
            tenant_id,
            BroadcastTarget::Tenant,
            WebSocketMessage::notification(tenant_id, notification),
        )
        .await
    }

    /// Push a notification to one user; a no-op when the user is not connected
    pub async fn broadcast_to_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        notification: &Notification,
    ) -> Result<(), HubError> {
        self.broadcast(
            tenant_id,
            BroadcastTarget::User(user_id),
            WebSocketMessage::notification(tenant_id, notification),
        )
        .await
    }

    /// Push a notification to the listed users that are currently connected
    pub async fn broadcast_to_users(
        &self,
        tenant_id: TenantId,
        user_ids: &[UserId],
        notification: &Notification,
    ) -> Result<(), HubError> {
        self.broadcast(
            tenant_id,
            BroadcastTarget::Users(user_ids.to_vec()),
            WebSocketMessage::notification(tenant_id, notification),
        )
        .await
    }

    /// Typing indicator for everyone in the tenant except the typist
    pub async fn broadcast_typing_indicator(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        is_typing: bool,
    ) -> Result<(), HubError> {
        self.broadcast(
            tenant_id,
            BroadcastTarget::TenantExcept(user_id),
            WebSocketMessage::typing(tenant_id, user_id, is_typing),
        )
        .await
    }

    /// Presence change for the whole tenant, the user included
    pub async fn broadcast_presence(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        status: &str,
    ) -> Result<(), HubError> {
        self.broadcast(
            tenant_id,
            BroadcastTarget::Tenant,
            WebSocketMessage::presence(tenant_id, user_id, status),
        )
        .await
    }

    pub async fn connected_users(&self, tenant_id: TenantId) -> Vec<UserId> {
        self.repository.list_users(tenant_id).await
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        self.repository.snapshot().await
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Stop workers, the heartbeat monitor and every read loop, then close
    /// and forget all connections.
    ///
    /// Only the first call does anything; later calls return at once.
    pub async fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        tracing::info!("Stopping notification hub");
        self.shutdown.cancel();

        if !self.dispatcher.join_workers(self.config.write_timeout).await {
            tracing::warn!("Some dispatch workers did not exit in time");
        }
        let abandoned = self.dispatcher.queued();
        if abandoned > 0 {
            tracing::info!(abandoned, "Discarding queued broadcast tasks");
        }

        if let Some(handle) = self.heartbeat.lock().await.take()
            && let Err(e) = handle.await
        {
            tracing::error!("Heartbeat monitor panicked: {}", e);
        }

        let connections = self.repository.drain().await;
        let closed = connections.len();
        let close_timeout = self.config.write_timeout;
        futures_util::stream::iter(connections)
            .for_each_concurrent(None, |connection| async move {
                match tokio::time::timeout(close_timeout, connection.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!(
                        connection_id = %connection.id(),
                        "Failed to close connection: {}",
                        e
                    ),
                    Err(_) => tracing::warn!(
                        connection_id = %connection.id(),
                        "Timed out closing connection"
                    ),
                }
            })
            .await;

        tracing::info!(closed, "Notification hub stopped");
    }

    fn ensure_running(&self) -> Result<(), HubError> {
        if self.is_stopped() {
            Err(HubError::Stopped)
        } else {
            Ok(())
        }
    }

    async fn broadcast(
        &self,
        tenant_id: TenantId,
        target: BroadcastTarget,
        message: WebSocketMessage,
    ) -> Result<(), HubError> {
        self.ensure_running()?;
        let payload = message.encode()?;

        let connections = ResolveTargetsUseCase::new(self.repository.clone())
            .execute(tenant_id, &target)
            .await;
        let targets = connections.len();

        let mut queued = 0usize;
        for connection in connections {
            match self
                .dispatcher
                .enqueue(BroadcastTask::new(connection, payload.clone()))
                .await
            {
                EnqueueOutcome::Queued => queued += 1,
                EnqueueOutcome::Dropped => {}
                EnqueueOutcome::Closed => break,
            }
        }

        tracing::debug!(
            college_id = %tenant_id,
            message_type = ?message.r#type,
            targets,
            queued,
            "Broadcast enqueued"
        );
        Ok(())
    }
}
