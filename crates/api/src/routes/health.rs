use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::registry::ActiveModel;
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

/// Service description returned by `GET /`.
#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    /// Most recently trained of the active models, if any.
    pub model_version: Option<String>,
    pub models: Vec<ActiveModel>,
}

/// GET /health -- returns service and database health. Always 200.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = parkcast_db::health_check(state.store.as_ref()).await;

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
    })
}

/// GET / -- service name, version and the models being served.
///
/// Reads the registry cache only; startup warm-up and the refresh task keep
/// it current, so this never touches storage.
async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    let models = state.models.active_models().await;
    let model_version = models
        .iter()
        .max_by_key(|m| m.trained_at)
        .map(|m| m.version.clone());

    Json(ServiceInfo {
        service: "parkcast",
        version: env!("CARGO_PKG_VERSION"),
        model_version,
        models,
    })
}

/// Mount service-level routes (intended for root level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
}
