//! HTTP API response DTOs for the ops endpoints.

use serde::{Deserialize, Serialize};

use crate::{domain::ConnectionStats, infrastructure::dispatcher::DispatchStats};

/// Response of `GET /api/ws/stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubStatsDto {
    pub connections: ConnectionStats,
    pub dispatch: DispatchStats,
}

/// Response of `GET /api/colleges/{college_id}/connected-users`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedUsersDto {
    pub college_id: i64,
    pub user_ids: Vec<i64>,
}
