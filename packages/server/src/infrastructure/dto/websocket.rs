//! WebSocket message DTOs and the codec for the notification hub.
//!
//! Every frame on the wire is one JSON object tagged by `type`. A broadcast
//! encodes its message once; the resulting `Arc<str>` is shared by every task
//! that targets a connection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::{Notification, TenantId, UserId};

/// Greeting carried by the first server-to-client frame
pub const CONNECTED_MESSAGE: &str = "Connected to campus notification hub";

/// Message type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Notification,
    Typing,
    Presence,
    Ping,
    Pong,
    Connected,
}

/// A single frame exchanged with clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketMessage {
    pub r#type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Clients may omit it on `ping`
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub college_id: Option<TenantId>,
}

impl WebSocketMessage {
    fn bare(r#type: MessageType) -> Self {
        Self {
            r#type,
            notification: None,
            data: None,
            timestamp: Utc::now(),
            user_id: None,
            college_id: None,
        }
    }

    /// Notification push for a tenant
    pub fn notification(college_id: TenantId, notification: &Notification) -> Self {
        Self {
            notification: Some(notification.clone()),
            college_id: Some(college_id),
            ..Self::bare(MessageType::Notification)
        }
    }

    /// Typing indicator originated by `user_id`
    pub fn typing(college_id: TenantId, user_id: UserId, is_typing: bool) -> Self {
        Self {
            data: Some(json!({ "is_typing": is_typing })),
            user_id: Some(user_id),
            college_id: Some(college_id),
            ..Self::bare(MessageType::Typing)
        }
    }

    /// Presence change of `user_id`
    pub fn presence(college_id: TenantId, user_id: UserId, status: &str) -> Self {
        Self {
            data: Some(json!({ "status": status })),
            user_id: Some(user_id),
            college_id: Some(college_id),
            ..Self::bare(MessageType::Presence)
        }
    }

    /// Welcome frame sent right after the upgrade
    pub fn connected(college_id: TenantId, user_id: UserId) -> Self {
        Self {
            data: Some(json!({ "message": CONNECTED_MESSAGE })),
            user_id: Some(user_id),
            college_id: Some(college_id),
            ..Self::bare(MessageType::Connected)
        }
    }

    pub fn ping() -> Self {
        Self::bare(MessageType::Ping)
    }

    pub fn pong() -> Self {
        Self::bare(MessageType::Pong)
    }

    /// Serialize once for fan-out
    pub fn encode(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
