//! Integration tests for the worker jobs against a fake city API and a
//! fresh SQLite database per test.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use parkcast_core::city::City;
use parkcast_core::error::CoreError;
use parkcast_core::training::TrainingConfig;
use parkcast_db::models::prediction::NewPrediction;
use parkcast_db::models::processed::ProcessedQuery;
use parkcast_db::{DbStore, ParkingStore, SqliteStore};
use parkcast_worker::error::{FetchError, JobError};
use parkcast_worker::jobs::{run_fetch, run_process, run_reconcile, run_train};
use parkcast_worker::scheduler::{Schedule, Scheduler};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

fn tolerance() -> chrono::Duration {
    chrono::Duration::minutes(15)
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn fetch_stores_raw_records_and_registers_garages(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let api = common::spawn_fake_api().await;

    let report = run_fetch(&store, &api.fetcher("/basel"), City::Basel).await.unwrap();
    assert_eq!(report.records, 3);
    assert_eq!(report.unidentified, 1);

    let locations = store.list_locations(Some("Basel")).await.unwrap();
    assert_eq!(locations.len(), 2);
    let steinen = locations.iter().find(|l| l.name == "Parkhaus Steinen").unwrap();
    assert_eq!(steinen.capacity, Some(526));
    assert_eq!(steinen.external_id.as_deref(), Some("parkhaus-steinen"));
    assert_eq!(steinen.latitude, Some(47.5527));

    let raw = store.list_raw("Basel", None).await.unwrap();
    assert_eq!(raw.len(), 3);
    assert_eq!(raw.iter().filter(|r| r.location_id.is_none()).count(), 1);
    assert_eq!(raw[0].payload.0["name"], "Parkhaus Steinen");
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn fetch_retries_transient_failures(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let api = common::spawn_fake_api().await;

    let report = run_fetch(&store, &api.fetcher("/flaky"), City::Basel).await.unwrap();

    assert_eq!(report.records, 3);
    assert_eq!(api.hits.load(Ordering::SeqCst), 2);
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn fetch_does_not_retry_client_errors(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let api = common::spawn_fake_api().await;

    let err = run_fetch(&store, &api.fetcher("/missing"), City::Basel)
        .await
        .unwrap_err();

    assert_matches!(err, JobError::Fetch(FetchError::HttpStatus { status: 404, .. }));
    assert_eq!(api.hits.load(Ordering::SeqCst), 1);
    assert!(store.list_raw("Basel", None).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn repeated_fetches_yield_one_observation_per_garage_and_time(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let api = common::spawn_fake_api().await;
    let fetcher = api.fetcher("/basel");

    run_fetch(&store, &fetcher, City::Basel).await.unwrap();
    run_fetch(&store, &fetcher, City::Basel).await.unwrap();

    let report = run_process(&store, City::Basel, None).await.unwrap();
    assert_eq!(report.raw, 6);
    assert_eq!(report.written, 2);
    assert_eq!(report.malformed, 2);
    assert_eq!(report.duplicates, 2);

    let processed = store
        .list_processed(&ProcessedQuery {
            city: Some("Basel".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(processed.len(), 2);
    let steinen = processed
        .iter()
        .find(|r| r.garage_name == "Parkhaus Steinen")
        .unwrap();
    assert_eq!(steinen.observed_at, Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap());
    assert_eq!(steinen.occupied, 400);
    assert_eq!(steinen.capacity, 526);
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn reprocessing_is_idempotent(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let api = common::spawn_fake_api().await;
    run_fetch(&store, &api.fetcher("/basel"), City::Basel).await.unwrap();

    let key = |r: &parkcast_db::models::processed::ProcessedRecord| {
        (r.location_id, r.observed_at, r.capacity, r.occupied, r.raw_id)
    };
    let query = ProcessedQuery {
        city: Some("Basel".into()),
        ..Default::default()
    };

    run_process(&store, City::Basel, None).await.unwrap();
    let first: Vec<_> = store.list_processed(&query).await.unwrap().iter().map(key).collect();
    run_process(&store, City::Basel, None).await.unwrap();
    let second: Vec<_> = store.list_processed(&query).await.unwrap().iter().map(key).collect();

    assert_eq!(first, second);
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn out_of_range_occupancy_is_clamped(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let api = common::spawn_fake_api().await;
    run_fetch(&store, &api.fetcher("/basel-clamped"), City::Basel).await.unwrap();

    let report = run_process(&store, City::Basel, None).await.unwrap();
    assert_eq!(report.clamped, 1);

    let processed = store
        .list_processed(&ProcessedQuery::default())
        .await
        .unwrap();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].occupied, 0);
    assert_eq!(processed[0].free_spaces, 526);
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn aarhus_feed_is_processed(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let api = common::spawn_fake_api().await;
    run_fetch(&store, &api.fetcher("/basel"), City::Aarhus).await.unwrap();

    let report = run_process(&store, City::Aarhus, None).await.unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(report.malformed, 0);

    let current = store.latest_processed("Aarhus").await.unwrap();
    let norreport = current.iter().find(|r| r.garage_name == "NORREPORT").unwrap();
    assert_eq!(norreport.occupied, 62);
    assert_eq!(norreport.free_spaces, 18);
    assert_eq!(norreport.observed_at, Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap());
}

// ---------------------------------------------------------------------------
// Train
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn train_writes_artifact_and_metadata(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let dir = tempfile::tempdir().unwrap();
    let a = common::seed_garage(&store, "Basel", "Parkhaus Steinen").await;
    let b = common::seed_garage(&store, "Basel", "Parkhaus Elisabethen").await;
    common::seed_history(&store, "Basel", a, "Parkhaus Steinen", 24 * 5).await;
    common::seed_history(&store, "Basel", b, "Parkhaus Elisabethen", 24 * 5).await;
    let trained_at = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

    let report = run_train(
        &store,
        City::Basel,
        None,
        dir.path(),
        &TrainingConfig::default(),
        trained_at,
    )
    .await
    .unwrap();

    assert_eq!(report.version, "20240310T000000000");
    assert!(report.model_path.exists());
    assert_eq!(report.n_train + report.n_eval, 2 * 24 * 5);
    assert!(report.mae.is_finite());

    let latest = store.latest_model("Basel").await.unwrap().unwrap();
    assert_eq!(latest.version, report.version);
    assert_eq!(latest.model_path, report.model_path.display().to_string());
    assert!(latest.garage_id.is_none());
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn garage_scope_model_is_not_the_city_model(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let dir = tempfile::tempdir().unwrap();
    let a = common::seed_garage(&store, "Basel", "Parkhaus Steinen").await;
    common::seed_history(&store, "Basel", a, "Parkhaus Steinen", 24 * 5).await;

    let report = run_train(
        &store,
        City::Basel,
        Some("parkhaus steinen"),
        dir.path(),
        &TrainingConfig::default(),
        Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(report.garage_id, Some(a));
    assert!(store.latest_model("Basel").await.unwrap().is_none());
    assert_eq!(store.list_models(Some("Basel")).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn train_with_too_little_history_fails(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let dir = tempfile::tempdir().unwrap();
    let a = common::seed_garage(&store, "Aarhus", "NORREPORT").await;
    common::seed_history(&store, "Aarhus", a, "NORREPORT", 10).await;

    let err = run_train(
        &store,
        City::Aarhus,
        None,
        dir.path(),
        &TrainingConfig::default(),
        Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
    )
    .await
    .unwrap_err();

    assert_matches!(
        err,
        JobError::Core(CoreError::InsufficientData { available: 10, required: 50, .. })
    );
    assert!(store.list_models(None).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn train_unknown_garage_is_not_found(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let dir = tempfile::tempdir().unwrap();

    let err = run_train(
        &store,
        City::Basel,
        Some("Nowhere"),
        dir.path(),
        &TrainingConfig::default(),
        Utc::now(),
    )
    .await
    .unwrap_err();

    assert_matches!(err, JobError::Core(CoreError::NotFound { .. }));
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

fn prediction(location_id: i64, target_hour: i64, predicted: i64) -> NewPrediction {
    NewPrediction {
        location_id,
        city: "Basel".into(),
        garage_name: "Parkhaus Steinen".into(),
        target_time: common::history_start() + chrono::Duration::hours(target_hour)
            + chrono::Duration::minutes(5),
        predicted_occupied: predicted,
        predicted_ratio: predicted as f64 / 100.0,
        capacity: 100,
        model_version: "20240301T000000000".into(),
        model_mae: Some(4.0),
        created_at: common::history_start(),
    }
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn reconcile_fills_actuals_from_nearby_observations(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let a = common::seed_garage(&store, "Basel", "Parkhaus Steinen").await;
    common::seed_history(&store, "Basel", a, "Parkhaus Steinen", 24).await;

    // 10:05 is five minutes from the 10:00 observation (occupied 50).
    let matched = store.insert_prediction(&prediction(a, 10, 60)).await.unwrap();
    // Two days later there is no history at all.
    let unmatched = store.insert_prediction(&prediction(a, 48, 60)).await.unwrap();

    let now = common::history_start() + chrono::Duration::days(3);
    let report = run_reconcile(&store, City::Basel, now, tolerance()).await.unwrap();
    assert_eq!(report.pending, 2);
    assert_eq!(report.reconciled, 1);
    assert_eq!(report.unmatched, 1);

    let logged = store.list_predictions("Basel", None, 10).await.unwrap();
    let filled = logged.iter().find(|p| p.id == matched.id).unwrap();
    assert_eq!(filled.actual_occupied, Some(50));
    assert_eq!(filled.prediction_error, Some(10.0));
    let open = logged.iter().find(|p| p.id == unmatched.id).unwrap();
    assert!(open.actual_occupied.is_none());

    let again = run_reconcile(&store, City::Basel, now, tolerance()).await.unwrap();
    assert_eq!(again.pending, 1);
    assert_eq!(again.reconciled, 0);
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn future_predictions_are_left_alone(pool: SqlitePool) {
    let store = SqliteStore::new(pool);
    let a = common::seed_garage(&store, "Basel", "Parkhaus Steinen").await;
    common::seed_history(&store, "Basel", a, "Parkhaus Steinen", 24).await;
    store.insert_prediction(&prediction(a, 10, 60)).await.unwrap();

    let report = run_reconcile(&store, City::Basel, common::history_start(), tolerance())
        .await
        .unwrap();
    assert_eq!(report.pending, 0);
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

fn schedule(dir: &std::path::Path) -> Schedule {
    Schedule {
        cities: vec![City::Basel, City::Aarhus],
        fetch_every: Duration::from_millis(20),
        train_every: Duration::from_secs(3600),
        model_dir: dir.to_path_buf(),
        training: TrainingConfig::default(),
    }
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn ingest_cycle_fetches_and_processes_every_city(pool: SqlitePool) {
    let store: DbStore = Arc::new(SqliteStore::new(pool));
    let api = common::spawn_fake_api().await;
    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = Scheduler::new(Arc::clone(&store), api.fetcher("/basel"), schedule(dir.path()));

    scheduler.ingest_cycle(City::Basel).await;
    scheduler.ingest_cycle(City::Aarhus).await;

    assert_eq!(store.latest_processed("Basel").await.unwrap().len(), 2);
    assert_eq!(store.latest_processed("Aarhus").await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn failing_city_does_not_stop_the_loop(pool: SqlitePool) {
    let store: DbStore = Arc::new(SqliteStore::new(pool));
    let api = common::spawn_fake_api().await;
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Scheduler::new(Arc::clone(&store), api.fetcher("/missing"), schedule(dir.path()));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    // Basel kept failing; Aarhus was ingested on every tick.
    assert!(api.hits.load(Ordering::SeqCst) >= 2);
    assert!(store.list_raw("Basel", None).await.unwrap().is_empty());
    assert_eq!(store.latest_processed("Aarhus").await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations/sqlite")]
async fn ingest_cycle_resumes_raw_left_by_an_earlier_run(pool: SqlitePool) {
    let store: DbStore = Arc::new(SqliteStore::new(pool));
    let api = common::spawn_fake_api().await;

    // A previous process fetched but stopped before processing.
    run_fetch(store.as_ref(), &api.fetcher("/basel"), City::Basel)
        .await
        .unwrap();
    assert!(store.latest_processed("Basel").await.unwrap().is_empty());

    // This run cannot fetch Basel at all.
    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = Scheduler::new(Arc::clone(&store), api.fetcher("/missing"), schedule(dir.path()));
    scheduler.ingest_cycle(City::Basel).await;

    assert_eq!(store.latest_processed("Basel").await.unwrap().len(), 2);
    assert_eq!(scheduler.unprocessed_since(City::Basel), None);
}
