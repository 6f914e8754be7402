//! Processed observation rows and the aggregate views read by the dashboard.

use parkcast_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Processed records
// ---------------------------------------------------------------------------

/// A canonical observation. Unique on `(location_id, observed_at)`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ProcessedRecord {
    pub id: DbId,
    pub location_id: DbId,
    /// The raw record this row was derived from.
    pub raw_id: Option<DbId>,
    pub city: String,
    pub garage_name: String,
    pub observed_at: Timestamp,
    pub capacity: i64,
    pub occupied: i64,
    pub free_spaces: i64,
    pub occupancy_ratio: f64,
    pub hour: i64,
    pub day_of_week: i64,
    pub is_weekend: bool,
    pub status: Option<String>,
    pub is_open: Option<bool>,
    pub processed_at: Timestamp,
}

/// Filter for processed-record listings. All fields are optional.
#[derive(Debug, Clone, Default)]
pub struct ProcessedQuery {
    pub city: Option<String>,
    pub location_id: Option<DbId>,
    /// Inclusive lower bound on `observed_at`.
    pub from: Option<Timestamp>,
    /// Inclusive upper bound on `observed_at`.
    pub to: Option<Timestamp>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Historical coverage of processed data for one city.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ProcessedStats {
    pub total_records: i64,
    pub unique_garages: i64,
    pub unique_timestamps: i64,
    pub date_start: Option<Timestamp>,
    pub date_end: Option<Timestamp>,
    pub avg_occupancy_ratio: Option<f64>,
}
