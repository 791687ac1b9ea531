//! Shared helpers for integration tests.
//!
//! `TestServer` runs the full router in-process on an ephemeral port; the
//! helpers below speak to it with tokio-tungstenite.

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use campus_notify_server::{
    HubConfig, NotificationHub,
    domain::{TenantId, UserId},
    ui::serve,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderValue, header::ORIGIN},
    },
};
use tokio_util::sync::CancellationToken;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TIMEOUT: Duration = Duration::from_secs(3);

pub struct TestServer {
    pub hub: Arc<NotificationHub>,
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(HubConfig::default()).await
    }

    pub async fn start_with(config: HubConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let hub = NotificationHub::new(config);
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        let server_hub = hub.clone();
        let handle = tokio::spawn(async move {
            serve(listener, server_hub, async move { token.cancelled().await })
                .await
                .expect("Test server failed");
        });

        Self {
            hub,
            addr,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Handshake request with gateway headers for (college_id, user_id)
    pub fn request(&self, college_id: &str, user_id: &str) -> Request {
        gateway_request(&self.ws_url(), college_id, user_id)
    }

    /// Connect, consume the `connected` welcome frame and wait for registration
    pub async fn connect(&self, college_id: i64, user_id: i64) -> WsStream {
        let request = self.request(&college_id.to_string(), &user_id.to_string());
        let (mut ws, _) = connect_async(request).await.expect("Failed to connect");
        let welcome = next_json(&mut ws).await.expect("No welcome frame");
        assert_eq!(welcome["type"], "connected");
        wait_registered(&self.hub, college_id, user_id).await;
        ws
    }

    /// Stop the server and wait for it to exit
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = tokio::time::timeout(TIMEOUT, handle).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Handshake request to `ws_url` carrying gateway identity headers
pub fn gateway_request(ws_url: &str, college_id: &str, user_id: &str) -> Request {
    let mut request = ws_url
        .into_client_request()
        .expect("Failed to build request");
    let headers = request.headers_mut();
    headers.insert("x-user-identity", HeaderValue::from_static("tester@example.edu"));
    headers.insert(
        "x-college-id",
        HeaderValue::from_str(college_id).expect("invalid header"),
    );
    headers.insert(
        "x-user-id",
        HeaderValue::from_str(user_id).expect("invalid header"),
    );
    request
}

pub fn with_origin(mut request: Request, origin: &'static str) -> Request {
    request
        .headers_mut()
        .insert(ORIGIN, HeaderValue::from_static(origin));
    request
}

/// HTTP status of a refused handshake
pub async fn rejection_status(request: Request) -> u16 {
    match connect_async(request).await {
        Ok(_) => panic!("Handshake unexpectedly succeeded"),
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("Unexpected handshake error: {}", e),
    }
}

/// Next text frame as JSON; `None` once the socket is closed
pub async fn next_json(ws: &mut WsStream) -> Option<serde_json::Value> {
    tokio::time::timeout(TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(text.as_str()).expect("Invalid JSON frame"));
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    })
    .await
    .expect("Timed out waiting for a frame")
}

pub async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame");
}

/// Poll `check` until it holds or the timeout expires
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Condition not met in time");
}

/// The welcome frame precedes registration; wait until (college_id, user_id) is listed
pub async fn wait_registered(hub: &Arc<NotificationHub>, college_id: i64, user_id: i64) {
    let tenant = TenantId::new(college_id).expect("invalid college id");
    let user = UserId::new(user_id).expect("invalid user id");
    eventually(|| {
        let hub = hub.clone();
        async move { hub.connected_users(tenant).await.contains(&user) }
    })
    .await;
}
