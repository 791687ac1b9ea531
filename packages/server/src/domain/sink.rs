//! Port for writing to a live socket.
//!
//! The hub never touches the transport directly: workers, the heartbeat
//! monitor and the lifecycle handler all write through this trait. The axum
//! implementation lives in `infrastructure::socket`.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::SinkError;

/// Write half of one connection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// Write one pre-encoded text frame
    async fn send_text(&self, payload: Arc<str>) -> Result<(), SinkError>;

    /// Write a protocol level ping frame
    async fn send_ping(&self) -> Result<(), SinkError>;

    /// Send a close frame and shut the write half down.
    ///
    /// Closing an already closed sink returns `Ok(())`.
    async fn close(&self) -> Result<(), SinkError>;
}
