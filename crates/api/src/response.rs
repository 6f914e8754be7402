//! Shared response envelope types for API handlers.
//!
//! `/api/v1` responses use a `{ "data": ... }` envelope. Dashboard responses
//! add a `stale` flag telling the client whether the payload came from the
//! snapshot cache rather than the database.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// `{ "data": T, "stale": bool }` envelope for dashboard reads.
#[derive(Debug, Serialize)]
pub struct DashboardResponse<T: Serialize> {
    pub data: T,
    pub stale: bool,
}
