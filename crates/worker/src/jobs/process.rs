//! Processing: raw records into validated, deduplicated observations.

use chrono::Utc;
use parkcast_core::city::City;
use parkcast_core::processing::{process, RawInput};
use parkcast_core::retry::retry;
use parkcast_core::types::Timestamp;
use parkcast_db::{ParkingStore, StoreError};

use super::STORE_RETRY;
use crate::error::JobError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Raw records read.
    pub raw: usize,
    /// Observations written (inserted or rewritten).
    pub written: u64,
    pub malformed: usize,
    pub clamped: usize,
    pub duplicates: usize,
}

/// Process the raw records of `city` fetched at or after `since` (all of
/// them when `None`).
///
/// The batch is written in one transaction, so a failed run leaves the
/// processed store untouched and can simply be repeated.
pub async fn run_process(
    store: &dyn ParkingStore,
    city: City,
    since: Option<Timestamp>,
) -> Result<ProcessReport, JobError> {
    let raw = store.list_raw(city.as_str(), since).await?;
    let inputs: Vec<RawInput<'_>> = raw
        .iter()
        .map(|r| RawInput {
            raw_id: r.id,
            location_id: r.location_id,
            fetched_at: r.fetched_at,
            payload: &r.payload.0,
        })
        .collect();

    let outcome = process(city, &inputs);

    let written = if outcome.observations.is_empty() {
        0
    } else {
        let processed_at = Utc::now();
        retry(STORE_RETRY, "write processed batch", StoreError::is_unavailable, || {
            store.write_processed_batch(&outcome.observations, processed_at)
        })
        .await?
    };

    let report = ProcessReport {
        raw: raw.len(),
        written,
        malformed: outcome.malformed.len(),
        clamped: outcome.clamped,
        duplicates: outcome.duplicates,
    };
    tracing::info!(
        city = %city,
        raw = report.raw,
        written = report.written,
        malformed = report.malformed,
        clamped = report.clamped,
        duplicates = report.duplicates,
        "Processed raw records",
    );
    Ok(report)
}
