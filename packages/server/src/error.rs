//! Error types surfaced by the hub facade and the server runner.

use thiserror::Error;

/// Errors returned by `NotificationHub` operations
#[derive(Debug, Error)]
pub enum HubError {
    /// `stop()` has already been called
    #[error("notification hub is stopped")]
    Stopped,

    /// The outgoing message could not be serialized; nothing was enqueued
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors that end the server process
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
