//! Storage abstraction.
//!
//! [`ParkingStore`] is the single seam between the domain and the database.
//! Two backends implement it with the same SQL: [`SqliteStore`] (file-backed,
//! the default) and [`PgStore`].

mod backends;
mod sql;

use async_trait::async_trait;
use parkcast_core::processing::Observation;
use parkcast_core::types::{DbId, Timestamp};

use crate::error::StoreError;
use crate::models::location::{ParkingLocation, UpsertLocation};
use crate::models::model_metadata::{ModelMetadata, NewModelMetadata};
use crate::models::prediction::{NewPrediction, Prediction};
use crate::models::processed::{ProcessedQuery, ProcessedRecord, ProcessedStats};
use crate::models::raw::{NewRawRecord, RawRecord};

pub use backends::{PgStore, SqliteStore};

/// Which database engine a store talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

/// Persistence operations for every table.
#[async_trait]
pub trait ParkingStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn run_migrations(&self) -> Result<(), StoreError>;

    // -- locations ----------------------------------------------------------

    /// Insert a location or refresh its attributes, keyed on `(city, name)`.
    async fn upsert_location(
        &self,
        location: &UpsertLocation,
        now: Timestamp,
    ) -> Result<ParkingLocation, StoreError>;

    async fn get_location(&self, id: DbId) -> Result<Option<ParkingLocation>, StoreError>;

    /// Locations whose name or external id matches `identifier`
    /// (case-insensitive), optionally restricted to one city.
    async fn find_locations(
        &self,
        identifier: &str,
        city: Option<&str>,
    ) -> Result<Vec<ParkingLocation>, StoreError>;

    async fn list_locations(&self, city: Option<&str>) -> Result<Vec<ParkingLocation>, StoreError>;

    // -- raw records --------------------------------------------------------

    /// Append raw records in one transaction, returning their ids in order.
    async fn insert_raw_batch(&self, records: &[NewRawRecord]) -> Result<Vec<DbId>, StoreError>;

    /// Raw records for a city, oldest first, optionally only those fetched
    /// at or after `since`.
    async fn list_raw(
        &self,
        city: &str,
        since: Option<Timestamp>,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// Fetch time of the oldest raw record of `city` that arrived after the
    /// most recent processing write, or `None` when nothing is waiting.
    async fn oldest_unprocessed_fetch(&self, city: &str)
        -> Result<Option<Timestamp>, StoreError>;

    // -- processed records --------------------------------------------------

    /// Upsert a processed batch on `(location_id, observed_at)`.
    ///
    /// All-or-nothing: any failure rolls the whole batch back.
    async fn write_processed_batch(
        &self,
        batch: &[Observation],
        processed_at: Timestamp,
    ) -> Result<u64, StoreError>;

    /// Processed records matching `query`, ordered by `(observed_at, location_id)`.
    async fn list_processed(&self, query: &ProcessedQuery)
        -> Result<Vec<ProcessedRecord>, StoreError>;

    /// Most recent processed record of every garage in `city`.
    async fn latest_processed(&self, city: &str) -> Result<Vec<ProcessedRecord>, StoreError>;

    /// The latest processed record of one garage.
    async fn latest_for_location(
        &self,
        location_id: DbId,
    ) -> Result<Option<ProcessedRecord>, StoreError>;

    async fn processed_stats(&self, city: &str) -> Result<ProcessedStats, StoreError>;

    /// The record of `location_id` observed closest to `at`, within `tolerance`.
    async fn processed_near(
        &self,
        location_id: DbId,
        at: Timestamp,
        tolerance: chrono::Duration,
    ) -> Result<Option<ProcessedRecord>, StoreError>;

    // -- predictions --------------------------------------------------------

    async fn insert_prediction(&self, prediction: &NewPrediction)
        -> Result<Prediction, StoreError>;

    /// Predictions for `city` logged at or after `since`, newest first.
    async fn list_predictions(
        &self,
        city: &str,
        since: Option<Timestamp>,
        limit: i64,
    ) -> Result<Vec<Prediction>, StoreError>;

    /// Predictions whose target time has passed but have no actual yet.
    async fn pending_predictions(
        &self,
        city: &str,
        before: Timestamp,
        limit: i64,
    ) -> Result<Vec<Prediction>, StoreError>;

    /// Fill the accuracy columns of a prediction. Returns `false` if they
    /// were already set.
    async fn record_actual(
        &self,
        prediction_id: DbId,
        actual_occupied: i64,
        prediction_error: f64,
    ) -> Result<bool, StoreError>;

    // -- model metadata -----------------------------------------------------

    async fn insert_model_metadata(
        &self,
        metadata: &NewModelMetadata,
    ) -> Result<ModelMetadata, StoreError>;

    /// The most recently recorded city-scope model.
    async fn latest_model(&self, city: &str) -> Result<Option<ModelMetadata>, StoreError>;

    async fn get_model(
        &self,
        city: &str,
        version: &str,
    ) -> Result<Option<ModelMetadata>, StoreError>;

    /// Recorded models, newest first.
    async fn list_models(&self, city: Option<&str>) -> Result<Vec<ModelMetadata>, StoreError>;
}

/// Pick the record observed closest to `at`; ties go to the earlier one.
pub(crate) fn nearest(records: Vec<ProcessedRecord>, at: Timestamp) -> Option<ProcessedRecord> {
    records
        .into_iter()
        .min_by_key(|r| ((r.observed_at - at).num_milliseconds().abs(), r.observed_at))
}
