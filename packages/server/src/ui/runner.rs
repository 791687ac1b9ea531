//! Router construction and server entry point.

use std::{future::Future, sync::Arc};

use axum::{Router, middleware, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerArgs,
    error::ServerError,
    hub::NotificationHub,
    ui::{
        auth::gateway_identity,
        handler::{connected_users, health_check, hub_stats, websocket_handler},
        signal::shutdown_signal,
        state::AppState,
    },
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_check))
        .route("/api/ws/stats", get(hub_stats))
        .route(
            "/api/colleges/{college_id}/connected-users",
            get(connected_users),
        )
        .layer(middleware::from_fn(gateway_identity))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C or SIGTERM
pub async fn run(args: ServerArgs) -> Result<(), ServerError> {
    let addr = args.bind_addr();
    let hub = NotificationHub::new(args.hub_config());

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!("Notification hub listening on {}", addr);

    serve(listener, hub, shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves, then stop the hub.
///
/// The hub is stopped before axum drains, so open WebSocket read loops end
/// instead of holding the server open.
pub async fn serve<F>(
    listener: TcpListener,
    hub: Arc<NotificationHub>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(Arc::new(AppState::new(hub.clone())));

    let shutdown_hub = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            shutdown_hub.stop().await;
        })
        .await?;

    hub.stop().await;
    tracing::info!("Server stopped");
    Ok(())
}
