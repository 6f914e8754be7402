//! Ingestion: fetch a city feed and store every garage record verbatim.

use chrono::Utc;
use parkcast_core::city::City;
use parkcast_core::retry::retry;
use parkcast_core::types::{DbId, Timestamp};
use parkcast_db::models::location::UpsertLocation;
use parkcast_db::models::raw::NewRawRecord;
use parkcast_db::{ParkingStore, StoreError};

use super::STORE_RETRY;
use crate::error::JobError;
use crate::fetcher::Fetcher;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub city: City,
    pub fetched_at: Timestamp,
    /// Raw records stored.
    pub records: usize,
    /// Records stored without a garage reference.
    pub unidentified: usize,
    pub raw_ids: Vec<DbId>,
}

/// Fetch `city`, register the garages it mentions and append the records to
/// the raw store.
pub async fn run_fetch(
    store: &dyn ParkingStore,
    fetcher: &Fetcher,
    city: City,
) -> Result<FetchReport, JobError> {
    let response = fetcher.fetch(city).await?;
    let fetched_at = Utc::now();
    let records = city.source_records(&response);

    if records.is_empty() {
        tracing::warn!(city = %city, url = fetcher.url_for(city), "Feed returned no records");
    }

    let mut batch = Vec::with_capacity(records.len());
    let mut unidentified = 0;
    for record in records {
        let location_id = match city.identity(&record) {
            Some(identity) => {
                let upsert = UpsertLocation::from_identity(city, identity);
                let location = retry(STORE_RETRY, "upsert location", StoreError::is_unavailable, || {
                    store.upsert_location(&upsert, fetched_at)
                })
                .await?;
                Some(location.id)
            }
            None => {
                unidentified += 1;
                None
            }
        };
        batch.push(NewRawRecord {
            location_id,
            city: city.as_str().to_owned(),
            fetched_at,
            payload: record,
        });
    }

    let raw_ids = retry(STORE_RETRY, "insert raw records", StoreError::is_unavailable, || {
        store.insert_raw_batch(&batch)
    })
    .await?;

    tracing::info!(
        city = %city,
        records = raw_ids.len(),
        unidentified,
        "Stored raw feed",
    );

    Ok(FetchReport {
        city,
        fetched_at,
        records: raw_ids.len(),
        unidentified,
        raw_ids,
    })
}
