//! SQLite and PostgreSQL implementations of [`ParkingStore`].
//!
//! Both backends run identical SQL, so the trait implementation is stamped
//! out once per pool type by `impl_parking_store!`.

use async_trait::async_trait;
use parkcast_core::processing::Observation;
use parkcast_core::types::{DbId, Timestamp};
use sqlx::migrate::Migrator;
use sqlx::types::Json;
use sqlx::{PgPool, SqlitePool};

use super::sql::*;
use super::{nearest, Backend, ParkingStore};
use crate::error::StoreError;
use crate::models::location::{ParkingLocation, UpsertLocation};
use crate::models::model_metadata::{ModelMetadata, NewModelMetadata};
use crate::models::prediction::{NewPrediction, Prediction};
use crate::models::processed::{ProcessedQuery, ProcessedRecord, ProcessedStats};
use crate::models::raw::{NewRawRecord, RawRecord};

static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("../../db/migrations/sqlite");
static POSTGRES_MIGRATOR: Migrator = sqlx::migrate!("../../db/migrations/postgres");

/// File-backed SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// PostgreSQL store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

macro_rules! impl_parking_store {
    ($store:ty, $backend:expr, $migrator:expr) => {
        #[async_trait]
        impl ParkingStore for $store {
            fn backend(&self) -> Backend {
                $backend
            }

            async fn ping(&self) -> Result<(), StoreError> {
                sqlx::query("SELECT 1").execute(&self.pool).await?;
                Ok(())
            }

            async fn run_migrations(&self) -> Result<(), StoreError> {
                $migrator.run(&self.pool).await?;
                Ok(())
            }

            async fn upsert_location(
                &self,
                location: &UpsertLocation,
                now: Timestamp,
            ) -> Result<ParkingLocation, StoreError> {
                let query = format!(
                    "INSERT INTO parking_locations \
                        (city, name, external_id, address, lot_type, url, \
                         latitude, longitude, capacity, is_active, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
                     ON CONFLICT (city, name) DO UPDATE SET \
                        external_id = COALESCE(excluded.external_id, parking_locations.external_id), \
                        address = COALESCE(excluded.address, parking_locations.address), \
                        lot_type = COALESCE(excluded.lot_type, parking_locations.lot_type), \
                        url = COALESCE(excluded.url, parking_locations.url), \
                        latitude = COALESCE(excluded.latitude, parking_locations.latitude), \
                        longitude = COALESCE(excluded.longitude, parking_locations.longitude), \
                        capacity = COALESCE(excluded.capacity, parking_locations.capacity), \
                        is_active = excluded.is_active, \
                        updated_at = excluded.updated_at \
                     RETURNING {LOCATION_COLUMNS}"
                );
                let row = sqlx::query_as::<_, ParkingLocation>(&query)
                    .bind(&location.city)
                    .bind(&location.name)
                    .bind(&location.external_id)
                    .bind(&location.address)
                    .bind(&location.lot_type)
                    .bind(&location.url)
                    .bind(location.latitude)
                    .bind(location.longitude)
                    .bind(location.capacity)
                    .bind(true)
                    .bind(now)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(row)
            }

            async fn get_location(&self, id: DbId) -> Result<Option<ParkingLocation>, StoreError> {
                let query = format!("SELECT {LOCATION_COLUMNS} FROM parking_locations WHERE id = $1");
                let row = sqlx::query_as::<_, ParkingLocation>(&query)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
                Ok(row)
            }

            async fn find_locations(
                &self,
                identifier: &str,
                city: Option<&str>,
            ) -> Result<Vec<ParkingLocation>, StoreError> {
                let query = format!(
                    "SELECT {LOCATION_COLUMNS} FROM parking_locations \
                     WHERE (LOWER(name) = LOWER($1) OR LOWER(external_id) = LOWER($1)) \
                       AND ($2 IS NULL OR LOWER(city) = LOWER($2)) \
                     ORDER BY id"
                );
                let rows = sqlx::query_as::<_, ParkingLocation>(&query)
                    .bind(identifier)
                    .bind(city)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            }

            async fn list_locations(
                &self,
                city: Option<&str>,
            ) -> Result<Vec<ParkingLocation>, StoreError> {
                let query = format!(
                    "SELECT {LOCATION_COLUMNS} FROM parking_locations \
                     WHERE ($1 IS NULL OR LOWER(city) = LOWER($1)) \
                     ORDER BY city, name"
                );
                let rows = sqlx::query_as::<_, ParkingLocation>(&query)
                    .bind(city)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            }

            async fn insert_raw_batch(
                &self,
                records: &[NewRawRecord],
            ) -> Result<Vec<DbId>, StoreError> {
                let query = "INSERT INTO raw_parking_data (location_id, city, fetched_at, payload) \
                             VALUES ($1, $2, $3, $4) RETURNING id";
                let mut ids = Vec::with_capacity(records.len());
                let mut tx = self.pool.begin().await?;
                for record in records {
                    let id = sqlx::query_scalar::<_, DbId>(query)
                        .bind(record.location_id)
                        .bind(&record.city)
                        .bind(record.fetched_at)
                        .bind(Json(&record.payload))
                        .fetch_one(&mut *tx)
                        .await?;
                    ids.push(id);
                }
                tx.commit().await?;
                Ok(ids)
            }

            async fn list_raw(
                &self,
                city: &str,
                since: Option<Timestamp>,
            ) -> Result<Vec<RawRecord>, StoreError> {
                let query = format!(
                    "SELECT {RAW_COLUMNS} FROM raw_parking_data \
                     WHERE city = $1 AND ($2 IS NULL OR fetched_at >= $2) \
                     ORDER BY fetched_at, id"
                );
                let rows = sqlx::query_as::<_, RawRecord>(&query)
                    .bind(city)
                    .bind(since)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            }

            async fn oldest_unprocessed_fetch(
                &self,
                city: &str,
            ) -> Result<Option<Timestamp>, StoreError> {
                let last_processed = sqlx::query_scalar::<_, Timestamp>(
                    "SELECT processed_at FROM processed_parking_data \
                     WHERE city = $1 ORDER BY processed_at DESC LIMIT 1",
                )
                .bind(city)
                .fetch_optional(&self.pool)
                .await?;
                let oldest = sqlx::query_scalar::<_, Timestamp>(
                    "SELECT fetched_at FROM raw_parking_data \
                     WHERE city = $1 AND ($2 IS NULL OR fetched_at > $2) \
                     ORDER BY fetched_at, id LIMIT 1",
                )
                .bind(city)
                .bind(last_processed)
                .fetch_optional(&self.pool)
                .await?;
                Ok(oldest)
            }

            async fn write_processed_batch(
                &self,
                batch: &[Observation],
                processed_at: Timestamp,
            ) -> Result<u64, StoreError> {
                let query = format!(
                    "INSERT INTO processed_parking_data ({PROCESSED_INSERT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
                     ON CONFLICT (location_id, observed_at) DO UPDATE SET \
                        raw_id = excluded.raw_id, \
                        city = excluded.city, \
                        garage_name = excluded.garage_name, \
                        capacity = excluded.capacity, \
                        occupied = excluded.occupied, \
                        free_spaces = excluded.free_spaces, \
                        occupancy_ratio = excluded.occupancy_ratio, \
                        hour = excluded.hour, \
                        day_of_week = excluded.day_of_week, \
                        is_weekend = excluded.is_weekend, \
                        status = excluded.status, \
                        is_open = excluded.is_open, \
                        processed_at = excluded.processed_at"
                );
                let mut written = 0;
                let mut tx = self.pool.begin().await?;
                for obs in batch {
                    written += sqlx::query(&query)
                        .bind(obs.location_id)
                        .bind(obs.raw_id)
                        .bind(&obs.city)
                        .bind(&obs.garage_name)
                        .bind(obs.observed_at)
                        .bind(obs.capacity)
                        .bind(obs.occupied)
                        .bind(obs.free_spaces)
                        .bind(obs.occupancy_ratio)
                        .bind(obs.hour)
                        .bind(obs.day_of_week)
                        .bind(obs.is_weekend)
                        .bind(&obs.status)
                        .bind(obs.is_open)
                        .bind(processed_at)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                }
                tx.commit().await?;
                Ok(written)
            }

            async fn list_processed(
                &self,
                q: &ProcessedQuery,
            ) -> Result<Vec<ProcessedRecord>, StoreError> {
                let query = format!(
                    "SELECT {PROCESSED_COLUMNS} FROM processed_parking_data \
                     WHERE ($1 IS NULL OR LOWER(city) = LOWER($1)) \
                       AND ($2 IS NULL OR location_id = $2) \
                       AND ($3 IS NULL OR observed_at >= $3) \
                       AND ($4 IS NULL OR observed_at <= $4) \
                     ORDER BY observed_at, location_id \
                     LIMIT $5"
                );
                let rows = sqlx::query_as::<_, ProcessedRecord>(&query)
                    .bind(&q.city)
                    .bind(q.location_id)
                    .bind(q.from)
                    .bind(q.to)
                    .bind(q.limit.unwrap_or(i64::MAX))
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            }

            async fn latest_processed(
                &self,
                city: &str,
            ) -> Result<Vec<ProcessedRecord>, StoreError> {
                let query = format!(
                    "SELECT {PROCESSED_COLUMNS} FROM processed_parking_data p \
                     WHERE LOWER(p.city) = LOWER($1) \
                       AND p.observed_at = ( \
                           SELECT MAX(q.observed_at) FROM processed_parking_data q \
                           WHERE q.location_id = p.location_id) \
                     ORDER BY p.garage_name"
                );
                let rows = sqlx::query_as::<_, ProcessedRecord>(&query)
                    .bind(city)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            }

            async fn latest_for_location(
                &self,
                location_id: DbId,
            ) -> Result<Option<ProcessedRecord>, StoreError> {
                let query = format!(
                    "SELECT {PROCESSED_COLUMNS} FROM processed_parking_data \
                     WHERE location_id = $1 \
                     ORDER BY observed_at DESC LIMIT 1"
                );
                let row = sqlx::query_as::<_, ProcessedRecord>(&query)
                    .bind(location_id)
                    .fetch_optional(&self.pool)
                    .await?;
                Ok(row)
            }

            async fn processed_stats(&self, city: &str) -> Result<ProcessedStats, StoreError> {
                let query = "SELECT \
                        COUNT(*) AS total_records, \
                        COUNT(DISTINCT location_id) AS unique_garages, \
                        COUNT(DISTINCT observed_at) AS unique_timestamps, \
                        MIN(observed_at) AS date_start, \
                        MAX(observed_at) AS date_end, \
                        AVG(occupancy_ratio) AS avg_occupancy_ratio \
                     FROM processed_parking_data \
                     WHERE LOWER(city) = LOWER($1)";
                let row = sqlx::query_as::<_, ProcessedStats>(query)
                    .bind(city)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(row)
            }

            async fn processed_near(
                &self,
                location_id: DbId,
                at: Timestamp,
                tolerance: chrono::Duration,
            ) -> Result<Option<ProcessedRecord>, StoreError> {
                let query = format!(
                    "SELECT {PROCESSED_COLUMNS} FROM processed_parking_data \
                     WHERE location_id = $1 AND observed_at >= $2 AND observed_at <= $3 \
                     ORDER BY observed_at"
                );
                let rows = sqlx::query_as::<_, ProcessedRecord>(&query)
                    .bind(location_id)
                    .bind(at - tolerance)
                    .bind(at + tolerance)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(nearest(rows, at))
            }

            async fn insert_prediction(
                &self,
                p: &NewPrediction,
            ) -> Result<Prediction, StoreError> {
                let query = format!(
                    "INSERT INTO predictions ({PREDICTION_INSERT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                     RETURNING {PREDICTION_COLUMNS}"
                );
                let row = sqlx::query_as::<_, Prediction>(&query)
                    .bind(p.location_id)
                    .bind(&p.city)
                    .bind(&p.garage_name)
                    .bind(p.target_time)
                    .bind(p.predicted_occupied)
                    .bind(p.predicted_ratio)
                    .bind(p.capacity)
                    .bind(&p.model_version)
                    .bind(p.model_mae)
                    .bind(p.created_at)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(row)
            }

            async fn list_predictions(
                &self,
                city: &str,
                since: Option<Timestamp>,
                limit: i64,
            ) -> Result<Vec<Prediction>, StoreError> {
                let query = format!(
                    "SELECT {PREDICTION_COLUMNS} FROM predictions \
                     WHERE LOWER(city) = LOWER($1) AND ($2 IS NULL OR created_at >= $2) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3"
                );
                let rows = sqlx::query_as::<_, Prediction>(&query)
                    .bind(city)
                    .bind(since)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            }

            async fn pending_predictions(
                &self,
                city: &str,
                before: Timestamp,
                limit: i64,
            ) -> Result<Vec<Prediction>, StoreError> {
                let query = format!(
                    "SELECT {PREDICTION_COLUMNS} FROM predictions \
                     WHERE LOWER(city) = LOWER($1) AND actual_occupied IS NULL AND target_time <= $2 \
                     ORDER BY target_time, id \
                     LIMIT $3"
                );
                let rows = sqlx::query_as::<_, Prediction>(&query)
                    .bind(city)
                    .bind(before)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            }

            async fn record_actual(
                &self,
                prediction_id: DbId,
                actual_occupied: i64,
                prediction_error: f64,
            ) -> Result<bool, StoreError> {
                let result = sqlx::query(
                    "UPDATE predictions SET actual_occupied = $2, prediction_error = $3 \
                     WHERE id = $1 AND actual_occupied IS NULL",
                )
                .bind(prediction_id)
                .bind(actual_occupied)
                .bind(prediction_error)
                .execute(&self.pool)
                .await?;
                Ok(result.rows_affected() > 0)
            }

            async fn insert_model_metadata(
                &self,
                m: &NewModelMetadata,
            ) -> Result<ModelMetadata, StoreError> {
                let query = format!(
                    "INSERT INTO model_metadata ({MODEL_INSERT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
                     RETURNING {MODEL_COLUMNS}"
                );
                let row = sqlx::query_as::<_, ModelMetadata>(&query)
                    .bind(&m.version)
                    .bind(&m.city)
                    .bind(m.garage_id)
                    .bind(m.trained_at)
                    .bind(m.n_train)
                    .bind(m.n_eval)
                    .bind(Json(&m.features))
                    .bind(m.mae)
                    .bind(m.rmse)
                    .bind(m.r2_score)
                    .bind(m.eval_boundary)
                    .bind(&m.model_path)
                    .bind(m.created_at)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(row)
            }

            async fn latest_model(&self, city: &str) -> Result<Option<ModelMetadata>, StoreError> {
                let query = format!(
                    "SELECT {MODEL_COLUMNS} FROM model_metadata \
                     WHERE LOWER(city) = LOWER($1) AND garage_id IS NULL \
                     ORDER BY id DESC LIMIT 1"
                );
                let row = sqlx::query_as::<_, ModelMetadata>(&query)
                    .bind(city)
                    .fetch_optional(&self.pool)
                    .await?;
                Ok(row)
            }

            async fn get_model(
                &self,
                city: &str,
                version: &str,
            ) -> Result<Option<ModelMetadata>, StoreError> {
                let query = format!(
                    "SELECT {MODEL_COLUMNS} FROM model_metadata \
                     WHERE LOWER(city) = LOWER($1) AND version = $2"
                );
                let row = sqlx::query_as::<_, ModelMetadata>(&query)
                    .bind(city)
                    .bind(version)
                    .fetch_optional(&self.pool)
                    .await?;
                Ok(row)
            }

            async fn list_models(
                &self,
                city: Option<&str>,
            ) -> Result<Vec<ModelMetadata>, StoreError> {
                let query = format!(
                    "SELECT {MODEL_COLUMNS} FROM model_metadata \
                     WHERE ($1 IS NULL OR LOWER(city) = LOWER($1)) \
                     ORDER BY id DESC"
                );
                let rows = sqlx::query_as::<_, ModelMetadata>(&query)
                    .bind(city)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            }
        }
    };
}

impl_parking_store!(SqliteStore, Backend::Sqlite, SQLITE_MIGRATOR);
impl_parking_store!(PgStore, Backend::Postgres, POSTGRES_MIGRATOR);
