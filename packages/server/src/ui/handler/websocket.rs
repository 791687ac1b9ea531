//! WebSocket connection handlers.

use std::{fmt::Display, sync::Arc};

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode, header::ORIGIN},
    response::{IntoResponse, Response},
};
use futures_util::{Stream, StreamExt};

use crate::{
    domain::{Connection, ConnectionSink, TenantId, UserId},
    hub::NotificationHub,
    infrastructure::{
        dto::websocket::{MessageType, WebSocketMessage},
        socket::WebSocketSink,
    },
    ui::{auth::AuthContext, state::AppState},
};

/// Upgrade entry point.
///
/// Rejections happen before any handshake: identity (401 / 400), origin
/// (403), hub stopped (503), malformed upgrade request (4xx from axum).
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    auth: Option<Extension<AuthContext>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let context = auth.map(|Extension(context)| context).unwrap_or_default();
    let (tenant_id, user_id) = match context.resolve() {
        Ok(ids) => ids,
        Err(rejection) => {
            tracing::warn!("Rejected WebSocket request: {}", rejection);
            return rejection.into_response();
        }
    };

    if let Some(origin) = headers.get(ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|origin| state.hub.config().is_origin_allowed(origin))
            .unwrap_or(false);
        if !allowed {
            tracing::warn!(
                college_id = %tenant_id,
                user_id = %user_id,
                "Rejected WebSocket request from origin {:?}",
                origin
            );
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    if state.hub.is_stopped() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(
                college_id = %tenant_id,
                user_id = %user_id,
                "Invalid WebSocket upgrade request: {}",
                rejection
            );
            return rejection.into_response();
        }
    };

    let hub = state.hub.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(
            college_id = %tenant_id,
            user_id = %user_id,
            "WebSocket upgrade failed: {}",
            e
        );
    })
    .on_upgrade(move |socket| handle_socket(socket, hub, tenant_id, user_id))
}

async fn handle_socket(
    socket: WebSocket,
    hub: Arc<NotificationHub>,
    tenant_id: TenantId,
    user_id: UserId,
) {
    let (sender, receiver) = socket.split();
    let sink = Arc::new(WebSocketSink::new(sender));

    if let Some(connection) = establish(&hub, tenant_id, user_id, sink).await {
        run_read_loop(&hub, &connection, receiver).await;
    }
}

/// Greet the client, then register it.
///
/// The welcome frame is written before the connection becomes visible to
/// broadcasts, so it is always the first frame the client sees.
pub(crate) async fn establish(
    hub: &NotificationHub,
    tenant_id: TenantId,
    user_id: UserId,
    sink: Arc<dyn ConnectionSink>,
) -> Option<Arc<Connection>> {
    let payload = match WebSocketMessage::connected(tenant_id, user_id).encode() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Failed to encode connected message: {}", e);
            close_sink(sink.as_ref()).await;
            return None;
        }
    };

    let write_timeout = hub.config().write_timeout;
    let sent = match tokio::time::timeout(write_timeout, sink.send_text(payload)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!("timed out after {} ms", write_timeout.as_millis())),
    };
    if let Err(e) = sent {
        tracing::warn!(
            college_id = %tenant_id,
            user_id = %user_id,
            "Failed to send connected message: {}",
            e
        );
        close_sink(sink.as_ref()).await;
        return None;
    }

    match hub.register_connection(tenant_id, user_id, sink.clone()).await {
        Ok(connection) => Some(connection),
        Err(e) => {
            tracing::warn!(
                college_id = %tenant_id,
                user_id = %user_id,
                "Could not register connection: {}",
                e
            );
            close_sink(sink.as_ref()).await;
            None
        }
    }
}

async fn close_sink(sink: &dyn ConnectionSink) {
    if let Err(e) = sink.close().await {
        tracing::debug!("Failed to close unregistered socket: {}", e);
    }
}

/// Read inbound frames until the peer goes away, the connection is closed
/// on the server side (replaced or evicted), or the hub stops.
///
/// Cleanup runs on every exit path.
pub(crate) async fn run_read_loop<S, E>(hub: &NotificationHub, connection: &Connection, mut receiver: S)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let shutdown = hub.shutdown_token();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::debug!(connection_id = %connection.id(), "Read loop cancelled by shutdown");
                break;
            }
            _ = connection.closed() => {
                tracing::debug!(connection_id = %connection.id(), "Read loop ended by server-side close");
                break;
            }
            next = receiver.next() => next,
        };

        match next {
            None => break,
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    "WebSocket read error: {}",
                    e
                );
                break;
            }
            Some(Ok(Message::Close(_))) => {
                tracing::debug!(connection_id = %connection.id(), "Client requested close");
                break;
            }
            Some(Ok(Message::Text(text))) => handle_text(hub, connection, text.as_str()).await,
            Some(Ok(Message::Pong(_))) => {
                tracing::debug!(connection_id = %connection.id(), "Received pong");
            }
            Some(Ok(_)) => {}
        }
    }

    hub.release_connection(connection).await;
}

async fn handle_text(hub: &NotificationHub, connection: &Connection, text: &str) {
    let message = match WebSocketMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(
                connection_id = %connection.id(),
                "Ignoring undecodable message: {}",
                e
            );
            return;
        }
    };

    if message.r#type != MessageType::Ping {
        return;
    }

    let payload = match WebSocketMessage::pong().encode() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Failed to encode pong: {}", e);
            return;
        }
    };
    let write_timeout = hub.config().write_timeout;
    match tokio::time::timeout(write_timeout, connection.send_text(payload)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(connection_id = %connection.id(), "Failed to send pong: {}", e),
        Err(_) => tracing::warn!(connection_id = %connection.id(), "Timed out sending pong"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::HubConfig,
        domain::{ConnectionRepository, SinkError},
        infrastructure::repository::InMemoryConnectionRepository,
    };
    use async_trait::async_trait;
    use futures_util::stream;
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl ConnectionSink for RecordingSink {
        async fn send_text(&self, payload: Arc<str>) -> Result<(), SinkError> {
            self.frames.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        async fn send_ping(&self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), SinkError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tenant() -> TenantId {
        TenantId::new(5).unwrap()
    }

    fn user(id: i64) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_read_error_cleans_up_only_that_connection() {
        // テスト項目: 読み取りエラーで終了した接続だけが Registry から削除される
        // given (前提条件):
        let hub = NotificationHub::new(HubConfig::default());
        let failing_sink = Arc::new(RecordingSink::default());
        let failing = hub
            .register_connection(tenant(), user(1), failing_sink.clone())
            .await
            .unwrap();
        hub.register_connection(tenant(), user(2), Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        let receiver = stream::iter(vec![Err::<Message, &str>("connection reset")]);

        // when (操作):
        run_read_loop(&hub, &failing, receiver).await;

        // then (期待する結果):
        assert_eq!(hub.connected_users(tenant()).await, vec![user(2)]);
        assert!(failing_sink.closed.load(Ordering::SeqCst));

        hub.stop().await;
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        // テスト項目: クライアントの ping に pong で応答し、不正な JSON は無視される
        // given (前提条件):
        let hub = NotificationHub::new(HubConfig::default());
        let sink = Arc::new(RecordingSink::default());
        let connection = hub
            .register_connection(tenant(), user(1), sink.clone())
            .await
            .unwrap();
        let receiver = stream::iter(vec![
            Ok::<Message, &str>(Message::Text("not json".into())),
            Ok(Message::Text(r#"{"type":"ping"}"#.into())),
            Ok(Message::Close(None)),
        ]);

        // when (操作):
        run_read_loop(&hub, &connection, receiver).await;

        // then (期待する結果):
        let frames = sink.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(frame["type"], "pong");
        assert!(hub.connected_users(tenant()).await.is_empty());

        hub.stop().await;
    }

    #[tokio::test]
    async fn test_read_loop_ends_on_shutdown() {
        // テスト項目: Hub の停止で読み取りループが終了する
        // given (前提条件):
        let hub = NotificationHub::new(HubConfig::default());
        let connection = hub
            .register_connection(tenant(), user(1), Arc::new(RecordingSink::default()))
            .await
            .unwrap();
        let receiver = stream::pending::<Result<Message, &str>>();

        // when (操作):
        hub.stop().await;
        run_read_loop(&hub, &connection, receiver).await;

        // then (期待する結果):
        assert!(hub.connected_users(tenant()).await.is_empty());
    }

    #[tokio::test]
    async fn test_replaced_connection_read_loop_ends_without_peer_reply() {
        // テスト項目: 再接続で置き換えられた接続は、相手が何も返さなくても読み取りループが終了する
        // given (前提条件):
        let hub = NotificationHub::new(HubConfig::default());
        let stale_sink = Arc::new(RecordingSink::default());
        let stale = hub
            .register_connection(tenant(), user(1), stale_sink.clone())
            .await
            .unwrap();
        let read_loop = tokio::spawn({
            let hub = hub.clone();
            let stale = stale.clone();
            async move {
                run_read_loop(&hub, &stale, stream::pending::<Result<Message, &str>>()).await;
            }
        });

        // when (操作):
        let fresh = hub
            .register_connection(tenant(), user(1), Arc::new(RecordingSink::default()))
            .await
            .unwrap();

        // then (期待する結果):
        tokio::time::timeout(Duration::from_secs(1), read_loop)
            .await
            .expect("read loop should end once the connection is closed")
            .unwrap();
        assert!(stale.is_closed());
        assert!(stale_sink.closed.load(Ordering::SeqCst));
        assert!(!fresh.is_closed());
        assert_eq!(hub.connected_users(tenant()).await, vec![user(1)]);

        hub.stop().await;
    }

    /// Records whether the registry already held the key when the first frame was written.
    struct OrderCheckingSink {
        repository: Arc<InMemoryConnectionRepository>,
        registered_at_first_frame: Mutex<Option<bool>>,
        frames: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ConnectionSink for OrderCheckingSink {
        async fn send_text(&self, payload: Arc<str>) -> Result<(), SinkError> {
            let registered = self.repository.get(tenant(), user(1)).await.is_some();
            self.registered_at_first_frame
                .lock()
                .unwrap()
                .get_or_insert(registered);
            self.frames.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        async fn send_ping(&self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_welcome_is_sent_before_registration() {
        // テスト項目: connected メッセージは Registry への登録より前に送信される
        // given (前提条件):
        let repository = Arc::new(InMemoryConnectionRepository::new());
        let hub = NotificationHub::with_repository(HubConfig::default(), repository.clone());
        let sink = Arc::new(OrderCheckingSink {
            repository: repository.clone(),
            registered_at_first_frame: Mutex::new(None),
            frames: Mutex::new(Vec::new()),
        });

        // when (操作):
        let connection = establish(&hub, tenant(), user(1), sink.clone()).await;

        // then (期待する結果):
        assert!(connection.is_some());
        assert_eq!(*sink.registered_at_first_frame.lock().unwrap(), Some(false));
        let frames = sink.frames.lock().unwrap().clone();
        let welcome: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(welcome["type"], "connected");
        assert_eq!(hub.connected_users(tenant()).await, vec![user(1)]);

        hub.stop().await;
    }

    #[tokio::test]
    async fn test_establish_after_stop_closes_socket() {
        // テスト項目: 停止済みの Hub では登録されず、ソケットが閉じられる
        // given (前提条件):
        let hub = NotificationHub::new(HubConfig::default());
        hub.stop().await;
        let sink = Arc::new(RecordingSink::default());

        // when (操作):
        let connection = establish(&hub, tenant(), user(1), sink.clone()).await;

        // then (期待する結果):
        assert!(connection.is_none());
        assert!(sink.closed.load(Ordering::SeqCst));
        assert!(hub.connected_users(tenant()).await.is_empty());
    }
}
