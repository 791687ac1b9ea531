//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    domain::TenantId,
    infrastructure::dto::http::{ConnectedUsersDto, HubStatsDto},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Registry and dispatcher counters
pub async fn hub_stats(State(state): State<Arc<AppState>>) -> Json<HubStatsDto> {
    Json(HubStatsDto {
        connections: state.hub.connection_stats().await,
        dispatch: state.hub.dispatch_stats(),
    })
}

/// Connected users of one college, in ascending order
pub async fn connected_users(
    State(state): State<Arc<AppState>>,
    Path(college_id): Path<String>,
) -> Result<Json<ConnectedUsersDto>, StatusCode> {
    let tenant_id = match college_id.parse::<TenantId>() {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Invalid college_id '{}': {}", college_id, e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let user_ids = state
        .hub
        .connected_users(tenant_id)
        .await
        .into_iter()
        .map(|user_id| user_id.value())
        .collect();

    Ok(Json(ConnectedUsersDto {
        college_id: tenant_id.value(),
        user_ids,
    }))
}
