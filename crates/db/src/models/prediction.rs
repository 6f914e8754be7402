//! Prediction log entity and DTO.

use parkcast_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A logged prediction.
///
/// `actual_occupied` and `prediction_error` start out null and are filled in
/// once by the reconcile job.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Prediction {
    pub id: DbId,
    pub location_id: DbId,
    pub city: String,
    pub garage_name: String,
    pub target_time: Timestamp,
    pub predicted_occupied: i64,
    pub predicted_ratio: f64,
    pub capacity: i64,
    pub model_version: String,
    pub model_mae: Option<f64>,
    pub actual_occupied: Option<i64>,
    pub prediction_error: Option<f64>,
    pub created_at: Timestamp,
}

/// DTO for appending a prediction.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub location_id: DbId,
    pub city: String,
    pub garage_name: String,
    pub target_time: Timestamp,
    pub predicted_occupied: i64,
    pub predicted_ratio: f64,
    pub capacity: i64,
    pub model_version: String,
    pub model_mae: Option<f64>,
    pub created_at: Timestamp,
}
