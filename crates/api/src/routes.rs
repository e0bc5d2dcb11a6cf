use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the admin HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(admin_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Exchanges
        .route("/exchanges", get(list_exchanges))
        .route("/exchanges/cached", get(cached_exchanges))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
    busy_workers: usize,
    max_workers: usize,
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthStatus {
        status: if state.is_terminated() { "stopping" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        busy_workers: state.busy_workers(),
        max_workers: state.max_workers,
    })
}

// ---------------------------------------------------------------------------
// Exchanges
// ---------------------------------------------------------------------------

async fn list_exchanges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.factory().exchanges())
}

async fn cached_exchanges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.cached_exchanges())
}
