use axum::routing::get;
use axum::Router;

use crate::handlers::locations;
use crate::state::AppState;

/// Routes mounted at `/locations`.
///
/// ```text
/// GET  /   -> list_locations
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(locations::list_locations))
}
