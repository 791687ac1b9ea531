//! axum WebSocket implementation of the `ConnectionSink` port.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use futures_util::{SinkExt, stream::SplitSink};
use tokio::sync::Mutex;

use crate::domain::{ConnectionSink, SinkError};

/// Write half of an upgraded axum WebSocket.
///
/// Workers, the heartbeat monitor and the read loop may write concurrently;
/// the mutex serialises frames on the wire.
pub struct WebSocketSink {
    sender: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WebSocketSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sender: Mutex::new(sender),
            closed: AtomicBool::new(false),
        }
    }

    async fn send(&self, message: Message) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let mut sender = self.sender.lock().await;
        sender
            .send(message)
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ConnectionSink for WebSocketSink {
    async fn send_text(&self, payload: Arc<str>) -> Result<(), SinkError> {
        self.send(Message::Text(payload.as_ref().into())).await
    }

    async fn send_ping(&self) -> Result<(), SinkError> {
        self.send(Message::Ping(Bytes::new())).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut sender = self.sender.lock().await;
        sender
            .close()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}
