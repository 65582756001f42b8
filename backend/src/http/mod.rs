// HTTP handlers and routing.

use std::sync::atomic::Ordering;

use axum::extract::State as AxumState;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::utils::monotonic_ms;
use crate::ws::ws_handler;

mod types;
pub use types::*;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/ws", get(ws_handler))
        .route("/", get(ws_handler))
        .with_state(app_state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

async fn get_status(AxumState(app_state): AxumState<AppState>) -> impl IntoResponse {
    Json(status_snapshot(&app_state).await)
}

pub async fn status_snapshot(app_state: &AppState) -> StatusResponse {
    let relay = app_state.shared.status.read().await.clone();
    let payload_pending = app_state.shared.front_end.lock().await.has_pending();
    let sensory_pending = app_state.shared.sensory.lock().await.has_pending();
    StatusResponse {
        relay,
        client_connected: app_state.client_connected.load(Ordering::Relaxed),
        payload_pending,
        sensory_pending,
        uptime_ms: monotonic_ms(app_state.start_instant),
    }
}
