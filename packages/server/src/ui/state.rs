//! Shared application state.

use std::sync::Arc;

use crate::hub::NotificationHub;

/// Shared application state
pub struct AppState {
    /// Hub facade（接続管理とブロードキャスト）
    pub hub: Arc<NotificationHub>,
}

impl AppState {
    pub fn new(hub: Arc<NotificationHub>) -> Self {
        Self { hub }
    }
}
