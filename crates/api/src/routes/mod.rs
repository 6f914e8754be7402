pub mod dashboard;
pub mod health;
pub mod locations;
pub mod models;
pub mod predict;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /locations                         list (?city=)
///
/// /models                            list recorded versions (?city=)
/// /models/active                     versions currently served
///
/// /dashboard/{city}/current          latest observation per garage
/// /dashboard/{city}/history          observations (?garage=&from=&to=&limit=)
/// /dashboard/{city}/predictions      recent predictions (?hours=&limit=)
/// /dashboard/{city}/stats            historical coverage + latest model
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/locations", locations::router())
        .nest("/models", models::router())
        .nest("/dashboard", dashboard::router())
}
