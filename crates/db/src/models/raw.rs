//! Raw source records (append-only audit trail).

use parkcast_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// One source record exactly as fetched.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RawRecord {
    pub id: DbId,
    /// `None` when the record carried no recognisable garage identity.
    pub location_id: Option<DbId>,
    pub city: String,
    pub fetched_at: Timestamp,
    pub payload: Json<serde_json::Value>,
}

/// DTO for appending a raw record.
#[derive(Debug, Clone)]
pub struct NewRawRecord {
    pub location_id: Option<DbId>,
    pub city: String,
    pub fetched_at: Timestamp,
    pub payload: serde_json::Value,
}
