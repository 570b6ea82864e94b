use axum::extract::State;
use axum::{routing::get, Json, Router};
use galley_engine::ImportStore;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database is reachable.
    pub db_healthy: bool,
}

/// GET /health -- returns service and database health.
async fn health_check<S: ImportStore>(State(state): State<AppState<S>>) -> Json<HealthResponse> {
    let db_healthy = state.service.healthy().await;

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router<S: ImportStore>() -> Router<AppState<S>> {
    Router::new().route("/health", get(health_check::<S>))
}
