#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use parkcast_core::features::calendar_parts;
use parkcast_core::processing::Observation;
use parkcast_core::training::{train, TrainScope, TrainingConfig, TrainingSample};
use parkcast_core::types::{DbId, Timestamp};
use parkcast_db::models::location::UpsertLocation;
use parkcast_db::models::model_metadata::{ModelMetadata, NewModelMetadata};
use parkcast_db::models::processed::ProcessedQuery;
use parkcast_db::models::raw::NewRawRecord;
use parkcast_db::{DbStore, ParkingStore, SqliteStore};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

use parkcast_api::config::ServerConfig;
use parkcast_api::router::build_app_router;
use parkcast_api::state::AppState;

/// Hours of hourly history seeded per garage.
pub const HISTORY_HOURS: i64 = 24 * 7;

/// Build a test `ServerConfig` with safe defaults, keeping all files under `dir`.
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: "sqlite::memory:".to_string(),
        model_dir: dir.join("models"),
        model_version: None,
        model_refresh_secs: 60,
        snapshot_dir: Some(dir.join("snapshots")),
    }
}

pub fn test_state(pool: SqlitePool, dir: &Path) -> AppState {
    let store: DbStore = Arc::new(SqliteStore::new(pool));
    AppState::new(store, test_config(dir))
}

/// The production router around `state`.
pub fn build_test_app(state: AppState) -> Router {
    let config = state.config.as_ref().clone();
    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Monday 2024-03-04 00:00 UTC; the first seeded observation.
pub fn history_start() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
}

pub async fn seed_garage(
    store: &dyn ParkingStore,
    city: &str,
    name: &str,
    capacity: Option<i64>,
) -> DbId {
    store
        .upsert_location(
            &UpsertLocation {
                city: city.to_string(),
                name: name.to_string(),
                external_id: Some(name.to_lowercase().replace(' ', "-")),
                capacity,
                ..Default::default()
            },
            history_start(),
        )
        .await
        .unwrap()
        .id
}

/// Daytime-peaking occupancy ratio for `hour`.
pub fn daily_ratio(hour: u32) -> f64 {
    0.5 - 0.35 * (2.0 * std::f64::consts::PI * f64::from(hour) / 24.0).cos()
}

/// A week of hourly observations for one garage.
pub async fn seed_history(
    store: &dyn ParkingStore,
    city: &str,
    location_id: DbId,
    garage: &str,
    capacity: i64,
) {
    let raw_ids = store
        .insert_raw_batch(&[NewRawRecord {
            location_id: Some(location_id),
            city: city.to_string(),
            fetched_at: history_start(),
            payload: json!({"name": garage}),
        }])
        .await
        .unwrap();

    let batch: Vec<Observation> = (0..HISTORY_HOURS)
        .map(|h| {
            let at = history_start() + Duration::hours(h);
            let parts = calendar_parts(at);
            let occupied = (daily_ratio(parts.hour) * capacity as f64).round() as i64;
            Observation {
                location_id,
                raw_id: raw_ids[0],
                city: city.to_string(),
                garage_name: garage.to_string(),
                observed_at: at,
                fetched_at: at,
                capacity,
                occupied,
                free_spaces: capacity - occupied,
                occupancy_ratio: occupied as f64 / capacity as f64,
                hour: i64::from(parts.hour),
                day_of_week: i64::from(parts.day_of_week),
                is_weekend: parts.is_weekend,
                status: Some("offen".to_string()),
                is_open: Some(true),
            }
        })
        .collect();
    store
        .write_processed_batch(&batch, history_start() + Duration::hours(HISTORY_HOURS))
        .await
        .unwrap();
}

/// Train a city model from stored history, save it under `model_dir` and
/// record its metadata.
pub async fn train_model(
    store: &dyn ParkingStore,
    model_dir: &Path,
    city: &str,
    trained_at: Timestamp,
) -> ModelMetadata {
    train_model_recorded_as(store, model_dir, city, trained_at, |path| {
        path.display().to_string()
    })
    .await
}

/// Like [`train_model`], but `record` decides the `model_path` stored in
/// the metadata row.
pub async fn train_model_recorded_as(
    store: &dyn ParkingStore,
    model_dir: &Path,
    city: &str,
    trained_at: Timestamp,
    record: impl Fn(&Path) -> String,
) -> ModelMetadata {
    let history = store
        .list_processed(&ProcessedQuery {
            city: Some(city.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let samples: Vec<TrainingSample> = history
        .iter()
        .map(|r| TrainingSample {
            location_id: r.location_id,
            observed_at: r.observed_at,
            capacity: r.capacity,
            occupied: r.occupied,
        })
        .collect();
    let scope = TrainScope {
        city: city.to_string(),
        garage_id: None,
    };
    let outcome = train(&samples, &scope, &TrainingConfig::default(), trained_at).unwrap();
    let path = outcome.artifact.save(model_dir).unwrap();
    store
        .insert_model_metadata(&NewModelMetadata::for_artifact(
            &outcome.artifact,
            outcome.n_train,
            outcome.n_eval,
            Some(outcome.eval_boundary),
            record(&path),
            trained_at,
        ))
        .await
        .unwrap()
}

/// Two Basel garages with a week of history; the second has no static
/// capacity. Returns their ids.
pub async fn seed_basel(store: &dyn ParkingStore) -> (DbId, DbId) {
    let steinen = seed_garage(store, "Basel", "Parkhaus Steinen", Some(500)).await;
    let elisabethen = seed_garage(store, "Basel", "Parkhaus Elisabethen", None).await;
    seed_history(store, "Basel", steinen, "Parkhaus Steinen", 500).await;
    seed_history(store, "Basel", elisabethen, "Parkhaus Elisabethen", 840).await;
    (steinen, elisabethen)
}
