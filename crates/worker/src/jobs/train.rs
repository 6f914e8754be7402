//! Training: fit a model on processed history and record its metadata.

use std::path::{Path, PathBuf};

use parkcast_core::city::City;
use parkcast_core::error::CoreError;
use parkcast_core::retry::retry;
use parkcast_core::training::{train, TrainScope, TrainingConfig, TrainingSample};
use parkcast_core::types::{DbId, Timestamp};
use parkcast_db::models::model_metadata::NewModelMetadata;
use parkcast_db::models::processed::ProcessedQuery;
use parkcast_db::{ParkingStore, StoreError};

use super::STORE_RETRY;
use crate::error::JobError;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub city: City,
    pub garage_id: Option<DbId>,
    pub version: String,
    pub model_path: PathBuf,
    pub n_train: usize,
    pub n_eval: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub excluded_garages: Vec<DbId>,
}

/// Train a model for `city`, or for one of its garages when `garage` is
/// given, on all processed history up to `trained_at`.
///
/// The artifact is written to `model_dir` before its metadata is recorded,
/// so a recorded version always has a file behind it.
pub async fn run_train(
    store: &dyn ParkingStore,
    city: City,
    garage: Option<&str>,
    model_dir: &Path,
    config: &TrainingConfig,
    trained_at: Timestamp,
) -> Result<TrainReport, JobError> {
    let garage_id = match garage {
        Some(identifier) => Some(resolve_garage(store, city, identifier).await?),
        None => None,
    };

    let history = store
        .list_processed(&ProcessedQuery {
            city: Some(city.as_str().to_owned()),
            location_id: garage_id,
            to: Some(trained_at),
            ..Default::default()
        })
        .await?;
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
        city: city.as_str().to_owned(),
        garage_id,
    };
    let outcome = train(&samples, &scope, config, trained_at)?;

    let artifact = outcome.artifact.clone();
    let dir = model_dir.to_path_buf();
    let model_path = tokio::task::spawn_blocking(move || artifact.save(&dir))
        .await
        .map_err(|e| CoreError::Internal(format!("artifact writer panicked: {e}")))??;

    let metadata = NewModelMetadata::for_artifact(
        &outcome.artifact,
        outcome.n_train,
        outcome.n_eval,
        Some(outcome.eval_boundary),
        model_path.display().to_string(),
        trained_at,
    );
    retry(STORE_RETRY, "record model metadata", StoreError::is_unavailable, || {
        store.insert_model_metadata(&metadata)
    })
    .await?;

    let metrics = &outcome.artifact.metrics;
    tracing::info!(
        city = %city,
        garage_id,
        version = %outcome.artifact.version,
        path = %model_path.display(),
        "Recorded model",
    );

    Ok(TrainReport {
        city,
        garage_id,
        version: outcome.artifact.version.clone(),
        model_path,
        n_train: outcome.n_train,
        n_eval: outcome.n_eval,
        mae: metrics.mae,
        rmse: metrics.rmse,
        r2: metrics.r2,
        excluded_garages: outcome.excluded_garages,
    })
}

async fn resolve_garage(
    store: &dyn ParkingStore,
    city: City,
    identifier: &str,
) -> Result<DbId, JobError> {
    let mut matches = store.find_locations(identifier, Some(city.as_str())).await?;
    match matches.len() {
        0 => Err(CoreError::NotFound {
            entity: "Garage",
            key: format!("{identifier} in {city}"),
        }
        .into()),
        1 => Ok(matches.remove(0).id),
        n => Err(CoreError::InvalidInput(format!(
            "garage {identifier:?} matches {n} garages in {city}"
        ))
        .into()),
    }
}
