#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use parkcast_core::city::City;
use parkcast_core::features::calendar_parts;
use parkcast_core::processing::Observation;
use parkcast_core::retry::RetryPolicy;
use parkcast_core::types::{DbId, Timestamp};
use parkcast_db::models::location::UpsertLocation;
use parkcast_db::models::raw::NewRawRecord;
use parkcast_db::ParkingStore;
use parkcast_worker::fetcher::Fetcher;
use serde_json::{json, Value};

/// Fast retries so failure tests stay quick.
pub const TEST_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_millis(5),
    max_delay: Duration::from_millis(20),
};

/// A local stand-in for the city APIs.
pub struct FakeApi {
    pub base_url: String,
    /// Requests served by `/flaky` and `/missing`.
    pub hits: Arc<AtomicUsize>,
}

impl FakeApi {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A fetcher pointed at `basel_path` and `/aarhus`.
    pub fn fetcher(&self, basel_path: &str) -> Fetcher {
        Fetcher::new(Duration::from_secs(5), TEST_RETRY)
            .unwrap()
            .with_url(City::Basel, self.url(basel_path))
            .with_url(City::Aarhus, self.url("/aarhus"))
    }
}

pub async fn spawn_fake_api() -> FakeApi {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/basel", get(|| async { Json(basel_feed()) }))
        .route("/basel-clamped", get(|| async { Json(basel_clamped_feed()) }))
        .route("/aarhus", get(|| async { Json(aarhus_feed()) }))
        .route("/flaky", get(flaky))
        .route("/missing", get(missing))
        .with_state(Arc::clone(&hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeApi {
        base_url: format!("http://{addr}"),
        hits,
    }
}

/// 503 on the first request, the Basel feed afterwards.
async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> Response {
    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    } else {
        Json(basel_feed()).into_response()
    }
}

async fn missing(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

// ---------------------------------------------------------------------------
// Feeds
// ---------------------------------------------------------------------------

pub fn basel_record(name: &str, published: &str, total: i64, free: i64) -> Value {
    json!({
        "id": name.to_lowercase().replace(' ', "-"),
        "name": name,
        "published": published,
        "total": total,
        "free": free,
        "status": "offen",
        "address": "Steinenschanze 5",
        "lot_type": "Parkhaus",
        "link": "https://www.parkleitsystem-basel.ch",
        "geo_point_2d": {"lat": 47.5527, "lon": 7.5888},
    })
}

/// Two garages plus one record without a name.
pub fn basel_feed() -> Value {
    json!({
        "total_count": 3,
        "results": [
            basel_record("Parkhaus Steinen", "2024-03-04T09:00:00+01:00", 526, 126),
            basel_record("Parkhaus Elisabethen", "2024-03-04T09:00:00+01:00", 840, 440),
            {"published": "2024-03-04T09:00:00+01:00", "total": 100, "free": 50},
        ],
    })
}

/// One garage reporting more free spaces than it has.
pub fn basel_clamped_feed() -> Value {
    json!({
        "results": [basel_record("Parkhaus Steinen", "2024-03-04T09:05:00+01:00", 526, 600)],
    })
}

pub fn aarhus_feed() -> Value {
    json!({
        "success": true,
        "result": {
            "records": [
                {"garageCode": "NORREPORT", "totalSpaces": 80, "vehicleCount": 62, "date": "2024/03/04 09:00:00"},
                {"garageCode": "SALLING", "totalSpaces": 700, "vehicleCount": 350, "date": "2024/03/04 09:00:00"},
            ],
        },
    })
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

pub fn history_start() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
}

pub async fn seed_garage(store: &dyn ParkingStore, city: &str, name: &str) -> DbId {
    store
        .upsert_location(
            &UpsertLocation {
                city: city.to_string(),
                name: name.to_string(),
                capacity: Some(100),
                ..Default::default()
            },
            history_start(),
        )
        .await
        .unwrap()
        .id
}

/// `hours` of hourly observations for one garage, capacity 100.
pub async fn seed_history(store: &dyn ParkingStore, city: &str, location_id: DbId, name: &str, hours: i64) {
    let raw_ids = store
        .insert_raw_batch(&[NewRawRecord {
            location_id: Some(location_id),
            city: city.to_string(),
            fetched_at: history_start(),
            payload: json!({"name": name}),
        }])
        .await
        .unwrap();

    let batch: Vec<Observation> = (0..hours)
        .map(|h| {
            let at = history_start() + chrono::Duration::hours(h);
            let parts = calendar_parts(at);
            let occupied = 20 + 3 * i64::from(parts.hour.min(20));
            Observation {
                location_id,
                raw_id: raw_ids[0],
                city: city.to_string(),
                garage_name: name.to_string(),
                observed_at: at,
                fetched_at: at,
                capacity: 100,
                occupied,
                free_spaces: 100 - occupied,
                occupancy_ratio: occupied as f64 / 100.0,
                hour: i64::from(parts.hour),
                day_of_week: i64::from(parts.day_of_week),
                is_weekend: parts.is_weekend,
                status: None,
                is_open: None,
            }
        })
        .collect();
    store.write_processed_batch(&batch, history_start()).await.unwrap();
}
