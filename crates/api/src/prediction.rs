//! Prediction service: garage + timestamp in, occupancy estimate out.

use std::str::FromStr;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use parkcast_core::city::City;
use parkcast_core::error::CoreError;
use parkcast_core::retry::{retry, RetryPolicy};
use parkcast_core::time::{parse_timestamp, truncate_to_seconds};
use parkcast_core::types::Timestamp;
use parkcast_db::models::location::ParkingLocation;
use parkcast_db::models::prediction::NewPrediction;
use parkcast_db::{ParkingStore, StoreError};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Retry budget for writing the prediction log entry.
const LOG_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_millis(50),
    max_delay: Duration::from_millis(500),
};

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    /// Garage name or source-API id.
    pub garage: String,
    /// Target time; RFC 3339 or a naive timestamp (taken as UTC).
    pub datetime: String,
    /// Disambiguates garages with the same name in different cities.
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub garage: String,
    pub city: String,
    /// Normalised target time (UTC, RFC 3339).
    pub datetime: String,
    pub predicted_occupancy: i64,
    /// `capacity - predicted_occupancy`.
    pub predicted_free: i64,
    pub capacity: i64,
    pub occupancy_ratio: f64,
    pub model_version: String,
}

/// Serve one prediction and log it.
pub async fn predict(state: &AppState, request: PredictRequest) -> AppResult<PredictResponse> {
    let garage = request.garage.trim();
    if garage.is_empty() {
        return Err(CoreError::InvalidInput("garage must not be empty".into()).into());
    }
    let target = parse_timestamp(&request.datetime)
        .map(truncate_to_seconds)
        .ok_or_else(|| {
            CoreError::InvalidInput(format!("cannot parse datetime {:?}", request.datetime))
        })?;
    let city_filter = request
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(City::from_str)
        .transpose()?;

    let location = resolve_garage(state.store.as_ref(), garage, city_filter).await?;
    let city = City::from_str(&location.city)?;
    let capacity = resolve_capacity(state.store.as_ref(), &location).await?;

    // One snapshot for the whole request.
    let model = state.models.current(city).await?;
    let (predicted, ratio) = model.predict_occupied(location.id, target, capacity);

    log_prediction(
        state.store.as_ref(),
        NewPrediction {
            location_id: location.id,
            city: location.city.clone(),
            garage_name: location.name.clone(),
            target_time: target,
            predicted_occupied: predicted,
            predicted_ratio: ratio,
            capacity,
            model_version: model.version.clone(),
            model_mae: Some(model.metrics.mae),
            created_at: Utc::now(),
        },
    )
    .await;

    Ok(PredictResponse {
        garage: location.name,
        city: location.city,
        datetime: format_timestamp(target),
        predicted_occupancy: predicted,
        predicted_free: capacity - predicted,
        capacity,
        occupancy_ratio: ratio,
        model_version: model.version.clone(),
    })
}

/// Find exactly one garage matching `identifier`.
pub async fn resolve_garage(
    store: &dyn ParkingStore,
    identifier: &str,
    city: Option<City>,
) -> AppResult<ParkingLocation> {
    let mut matches = store
        .find_locations(identifier, city.map(City::as_str))
        .await?;
    match matches.len() {
        0 => Err(CoreError::NotFound {
            entity: "Garage",
            key: identifier.to_string(),
        }
        .into()),
        1 => Ok(matches.remove(0)),
        _ => {
            let cities: Vec<&str> = matches.iter().map(|l| l.city.as_str()).collect();
            Err(CoreError::InvalidInput(format!(
                "garage {identifier:?} exists in several cities ({}); pass city",
                cities.join(", ")
            ))
            .into())
        }
    }
}

/// Static capacity, falling back to the latest observed capacity.
async fn resolve_capacity(store: &dyn ParkingStore, location: &ParkingLocation) -> AppResult<i64> {
    if let Some(capacity) = location.capacity.filter(|c| *c > 0) {
        return Ok(capacity);
    }
    match store.latest_for_location(location.id).await? {
        Some(record) => Ok(record.capacity),
        None => Err(AppError::Unprocessable(format!(
            "capacity of garage {:?} is unknown",
            location.name
        ))),
    }
}

/// Append to the prediction log. Failures are logged and swallowed.
async fn log_prediction(store: &dyn ParkingStore, entry: NewPrediction) {
    let result = retry(LOG_RETRY, "log prediction", StoreError::is_unavailable, || {
        store.insert_prediction(&entry)
    })
    .await;
    if let Err(e) = result {
        tracing::error!(
            location_id = entry.location_id,
            model_version = %entry.model_version,
            error = %e,
            "Failed to log prediction",
        );
    }
}

pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
