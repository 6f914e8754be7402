//! Route definitions for the read-only dashboard.

use axum::routing::get;
use axum::Router;

use crate::handlers::dashboard;
use crate::state::AppState;

/// Dashboard routes mounted at `/dashboard`.
///
/// ```text
/// GET  /{city}/current       -> current
/// GET  /{city}/history       -> history
/// GET  /{city}/predictions   -> predictions
/// GET  /{city}/stats         -> stats
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{city}/current", get(dashboard::current))
        .route("/{city}/history", get(dashboard::history))
        .route("/{city}/predictions", get(dashboard::predictions))
        .route("/{city}/stats", get(dashboard::stats))
}
