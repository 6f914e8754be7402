//! Read-only dashboard endpoints.
//!
//! Every successful read is cached in the [`SnapshotCache`]. If storage is
//! unreachable the last snapshot for the same key is served with
//! `"stale": true`; with no snapshot the storage error is returned as-is.
//!
//! [`SnapshotCache`]: crate::snapshot::SnapshotCache

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use parkcast_core::city::City;
use parkcast_core::error::CoreError;
use parkcast_core::time::{parse_timestamp, truncate_to_seconds};
use parkcast_core::types::{DbId, Timestamp};
use parkcast_db::models::prediction::Prediction;
use parkcast_db::models::processed::{ProcessedQuery, ProcessedRecord, ProcessedStats};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::prediction::{format_timestamp, resolve_garage};
use crate::query::{HistoryParams, PredictionWindowParams};
use crate::response::DashboardResponse;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 2_000;
const MAX_HISTORY_LIMIT: i64 = 10_000;
const DEFAULT_PREDICTION_HOURS: i64 = 24;
const MAX_PREDICTION_HOURS: i64 = 24 * 30;
const DEFAULT_PREDICTION_LIMIT: i64 = 200;
const MAX_PREDICTION_LIMIT: i64 = 1_000;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Latest observation of one garage.
#[derive(Debug, Serialize)]
pub struct GarageStatus {
    pub location_id: DbId,
    pub name: String,
    pub observed_at: Timestamp,
    pub capacity: i64,
    pub occupied: i64,
    pub free_spaces: i64,
    pub occupancy_ratio: f64,
    pub status: Option<String>,
    pub is_open: Option<bool>,
}

impl From<ProcessedRecord> for GarageStatus {
    fn from(r: ProcessedRecord) -> Self {
        Self {
            location_id: r.location_id,
            name: r.garage_name,
            observed_at: r.observed_at,
            capacity: r.capacity,
            occupied: r.occupied,
            free_spaces: r.free_spaces,
            occupancy_ratio: r.occupancy_ratio,
            status: r.status,
            is_open: r.is_open,
        }
    }
}

/// City-wide current occupancy.
#[derive(Debug, Serialize)]
pub struct CurrentOccupancy {
    pub city: String,
    /// Newest observation time across all garages.
    pub as_of: Option<Timestamp>,
    pub total_capacity: i64,
    pub total_occupied: i64,
    pub occupancy_ratio: Option<f64>,
    pub garages: Vec<GarageStatus>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPoint {
    pub location_id: DbId,
    pub garage_name: String,
    pub observed_at: Timestamp,
    pub capacity: i64,
    pub occupied: i64,
    pub occupancy_ratio: f64,
}

#[derive(Debug, Serialize)]
pub struct OccupancyHistory {
    pub city: String,
    pub garage: Option<String>,
    pub points: Vec<HistoryPoint>,
}

#[derive(Debug, Serialize)]
pub struct RecentPredictions {
    pub city: String,
    pub hours: i64,
    /// Mean absolute error over the reconciled predictions in the window.
    pub realised_mae: Option<f64>,
    pub reconciled: usize,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub version: String,
    pub trained_at: Timestamp,
    pub n_train: i64,
    pub n_eval: i64,
    pub mae: f64,
    pub rmse: f64,
    pub r2_score: f64,
}

#[derive(Debug, Serialize)]
pub struct CityStats {
    pub city: String,
    #[serde(flatten)]
    pub history: ProcessedStats,
    pub latest_model: Option<ModelSummary>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/dashboard/{city}/current
pub async fn current(
    State(state): State<AppState>,
    Path(city): Path<String>,
) -> AppResult<Json<DashboardResponse<Value>>> {
    let city = City::from_str(&city)?;
    let key = format!("{}-current", city.as_str().to_lowercase());

    let load = async {
        let garages: Vec<GarageStatus> = state
            .store
            .latest_processed(city.as_str())
            .await?
            .into_iter()
            .map(GarageStatus::from)
            .collect();
        let total_capacity: i64 = garages.iter().map(|g| g.capacity).sum();
        let total_occupied: i64 = garages.iter().map(|g| g.occupied).sum();
        Ok::<_, AppError>(CurrentOccupancy {
            city: city.as_str().to_string(),
            as_of: garages.iter().map(|g| g.observed_at).max(),
            total_capacity,
            total_occupied,
            occupancy_ratio: (total_capacity > 0)
                .then(|| total_occupied as f64 / total_capacity as f64),
            garages,
        })
    };
    with_snapshot(&state, &key, load.await).await
}

/// GET /api/v1/dashboard/{city}/history?garage=&from=&to=&limit=
pub async fn history(
    State(state): State<AppState>,
    Path(city): Path<String>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<DashboardResponse<Value>>> {
    let city = City::from_str(&city)?;
    let from = parse_bound("from", params.from.as_deref())?;
    let to = parse_bound("to", params.to.as_deref())?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(CoreError::InvalidInput("from must not be after to".into()).into());
        }
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let garage = params
        .garage
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty());

    // Built from normalised values so equivalent queries share one snapshot.
    let bound = |ts: Option<Timestamp>| ts.map(format_timestamp).unwrap_or_default();
    let key = format!(
        "{}-history-{}|{}|{limit}|{}",
        city.as_str().to_lowercase(),
        bound(from),
        bound(to),
        garage.map_or_else(|| "*".to_string(), str::to_lowercase),
    );

    let load = async {
        let location_id = match garage {
            Some(name) => Some(resolve_garage(state.store.as_ref(), name, Some(city)).await?.id),
            None => None,
        };
        let records = state
            .store
            .list_processed(&ProcessedQuery {
                city: Some(city.as_str().to_string()),
                location_id,
                from,
                to,
                limit: Some(limit),
            })
            .await?;
        Ok::<_, AppError>(OccupancyHistory {
            city: city.as_str().to_string(),
            garage: garage.map(str::to_string),
            points: records
                .into_iter()
                .map(|r| HistoryPoint {
                    location_id: r.location_id,
                    garage_name: r.garage_name,
                    observed_at: r.observed_at,
                    capacity: r.capacity,
                    occupied: r.occupied,
                    occupancy_ratio: r.occupancy_ratio,
                })
                .collect(),
        })
    };
    with_snapshot(&state, &key, load.await).await
}

/// GET /api/v1/dashboard/{city}/predictions?hours=&limit=
pub async fn predictions(
    State(state): State<AppState>,
    Path(city): Path<String>,
    Query(params): Query<PredictionWindowParams>,
) -> AppResult<Json<DashboardResponse<Value>>> {
    let city = City::from_str(&city)?;
    let hours = params
        .hours
        .unwrap_or(DEFAULT_PREDICTION_HOURS)
        .clamp(1, MAX_PREDICTION_HOURS);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PREDICTION_LIMIT)
        .clamp(1, MAX_PREDICTION_LIMIT);
    let key = format!("{}-predictions-{hours}-{limit}", city.as_str().to_lowercase());

    let load = async {
        let since = Utc::now() - Duration::hours(hours);
        let predictions = state
            .store
            .list_predictions(city.as_str(), Some(since), limit)
            .await?;
        let errors: Vec<f64> = predictions
            .iter()
            .filter_map(|p| p.prediction_error)
            .collect();
        let realised_mae = (!errors.is_empty())
            .then(|| errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64);
        Ok::<_, AppError>(RecentPredictions {
            city: city.as_str().to_string(),
            hours,
            realised_mae,
            reconciled: errors.len(),
            predictions,
        })
    };
    with_snapshot(&state, &key, load.await).await
}

/// GET /api/v1/dashboard/{city}/stats
pub async fn stats(
    State(state): State<AppState>,
    Path(city): Path<String>,
) -> AppResult<Json<DashboardResponse<Value>>> {
    let city = City::from_str(&city)?;
    let key = format!("{}-stats", city.as_str().to_lowercase());

    let load = async {
        let history = state.store.processed_stats(city.as_str()).await?;
        let latest_model = state
            .store
            .latest_model(city.as_str())
            .await?
            .map(|m| ModelSummary {
                version: m.version,
                trained_at: m.trained_at,
                n_train: m.n_train,
                n_eval: m.n_eval,
                mae: m.mae,
                rmse: m.rmse,
                r2_score: m.r2_score,
            });
        Ok::<_, AppError>(CityStats {
            city: city.as_str().to_string(),
            history,
            latest_model,
        })
    };
    with_snapshot(&state, &key, load.await).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Cache a fresh payload, or fall back to the cached one on a storage outage.
async fn with_snapshot<T: Serialize>(
    state: &AppState,
    key: &str,
    loaded: Result<T, AppError>,
) -> AppResult<Json<DashboardResponse<Value>>> {
    match loaded {
        Ok(data) => {
            let value = serde_json::to_value(&data)
                .map_err(|e| AppError::InternalError(format!("cannot serialise {key}: {e}")))?;
            state.snapshots.put(key, value.clone()).await;
            Ok(Json(DashboardResponse {
                data: value,
                stale: false,
            }))
        }
        Err(err) if is_storage_outage(&err) => match state.snapshots.get(key).await {
            Some(value) => {
                tracing::warn!(key, error = %err, "Serving stale dashboard snapshot");
                Ok(Json(DashboardResponse {
                    data: value,
                    stale: true,
                }))
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

fn is_storage_outage(err: &AppError) -> bool {
    match err {
        AppError::Store(e) => e.is_unavailable(),
        AppError::Core(CoreError::StorageUnavailable(_)) => true,
        _ => false,
    }
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<Timestamp>, CoreError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw)
            .map(|ts| Some(truncate_to_seconds(ts)))
            .ok_or_else(|| CoreError::InvalidInput(format!("cannot parse {name} {raw:?}"))),
    }
}
