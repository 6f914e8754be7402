//! Model training: sample selection, temporal split, fitting and evaluation.
//!
//! The evaluation window is the most recent `eval_fraction` of the history.
//! Every sample stamped at or after the boundary timestamp is held out, so
//! each evaluation timestamp is strictly later than each training timestamp.

use std::collections::{BTreeMap, BTreeSet};

use crate::artifact::{version_for, ModelArtifact};
use crate::error::CoreError;
use crate::features::{feature_vector, TIME_FEATURE_NAMES};
use crate::regression::{EvalMetrics, RidgeRegression};
use crate::types::{DbId, Timestamp};

/// Minimum processed history per garage before it can be trained on.
pub const DEFAULT_MIN_RECORDS_PER_GARAGE: usize = 50;
/// Share of the (time-ordered) history held out for evaluation.
pub const DEFAULT_EVAL_FRACTION: f64 = 0.2;
pub const DEFAULT_RIDGE_LAMBDA: f64 = 1.0;

/// One processed observation as seen by the trainer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    pub location_id: DbId,
    pub observed_at: Timestamp,
    pub capacity: i64,
    pub occupied: i64,
}

impl TrainingSample {
    fn ratio(&self) -> f64 {
        self.occupied as f64 / self.capacity as f64
    }
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub min_records_per_garage: usize,
    pub eval_fraction: f64,
    pub ridge_lambda: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_records_per_garage: DEFAULT_MIN_RECORDS_PER_GARAGE,
            eval_fraction: DEFAULT_EVAL_FRACTION,
            ridge_lambda: DEFAULT_RIDGE_LAMBDA,
        }
    }
}

/// What a model is trained for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainScope {
    pub city: String,
    pub garage_id: Option<DbId>,
}

impl TrainScope {
    fn label(&self) -> String {
        match self.garage_id {
            Some(id) => format!("{} garage {id}", self.city),
            None => self.city.clone(),
        }
    }
}

/// Time-ordered train/eval partition.
#[derive(Debug, Clone)]
pub struct TemporalSplit {
    pub train: Vec<TrainingSample>,
    pub eval: Vec<TrainingSample>,
    /// First evaluation timestamp; all training samples are strictly earlier.
    pub boundary: Timestamp,
}

/// Split samples at a timestamp boundary.
///
/// Returns `None` when either side would be empty (including the case where
/// the whole history shares one timestamp).
pub fn temporal_split(samples: &[TrainingSample], eval_fraction: f64) -> Option<TemporalSplit> {
    if samples.len() < 2 {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| (s.observed_at, s.location_id));

    let n = sorted.len();
    let eval_count = ((n as f64 * eval_fraction.clamp(0.0, 1.0)).ceil() as usize).clamp(1, n - 1);
    let boundary = sorted[n - eval_count].observed_at;

    let (train, eval): (Vec<_>, Vec<_>) = sorted.into_iter().partition(|s| s.observed_at < boundary);
    if train.is_empty() || eval.is_empty() {
        return None;
    }
    Some(TemporalSplit {
        train,
        eval,
        boundary,
    })
}

/// Output of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub n_train: usize,
    pub n_eval: usize,
    pub eval_boundary: Timestamp,
    /// Garages dropped for having too little history.
    pub excluded_garages: Vec<DbId>,
}

/// Train a model for `scope` from processed history.
pub fn train(
    samples: &[TrainingSample],
    scope: &TrainScope,
    config: &TrainingConfig,
    trained_at: Timestamp,
) -> Result<TrainingOutcome, CoreError> {
    let usable: Vec<TrainingSample> = samples
        .iter()
        .filter(|s| s.capacity > 0)
        .filter(|s| scope.garage_id.map_or(true, |g| s.location_id == g))
        .copied()
        .collect();

    let mut per_garage: BTreeMap<DbId, usize> = BTreeMap::new();
    for s in &usable {
        *per_garage.entry(s.location_id).or_default() += 1;
    }

    let required = config.min_records_per_garage;
    let kept: BTreeSet<DbId> = per_garage
        .iter()
        .filter(|(_, count)| **count >= required)
        .map(|(id, _)| *id)
        .collect();
    let excluded_garages: Vec<DbId> = per_garage
        .keys()
        .filter(|id| !kept.contains(id))
        .copied()
        .collect();

    if kept.is_empty() {
        return Err(CoreError::InsufficientData {
            scope: scope.label(),
            available: per_garage.values().copied().max().unwrap_or(0),
            required,
        });
    }
    for id in &excluded_garages {
        tracing::warn!(
            scope = %scope.label(),
            location_id = id,
            records = per_garage[id],
            required,
            "Excluding garage with insufficient history",
        );
    }

    let history: Vec<TrainingSample> = usable
        .into_iter()
        .filter(|s| kept.contains(&s.location_id))
        .collect();

    let split = temporal_split(&history, config.eval_fraction).ok_or_else(|| {
        CoreError::InsufficientData {
            scope: scope.label(),
            available: history.len(),
            required: required.max(2),
        }
    })?;

    let garage_columns: BTreeMap<DbId, usize> = if scope.garage_id.is_some() {
        BTreeMap::new()
    } else {
        kept.iter().enumerate().map(|(col, id)| (*id, col)).collect()
    };
    let width = garage_columns.len();

    let rows: Vec<Vec<f64>> = split
        .train
        .iter()
        .map(|s| feature_vector(s.observed_at, garage_columns.get(&s.location_id).copied(), width))
        .collect();
    let targets: Vec<f64> = split.train.iter().map(TrainingSample::ratio).collect();
    let model = RidgeRegression::fit(&rows, &targets, config.ridge_lambda)?;

    let mut feature_names: Vec<String> = TIME_FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
    feature_names.extend(garage_columns.keys().map(|id| format!("garage_{id}")));

    let mut artifact = ModelArtifact {
        version: version_for(trained_at),
        city: scope.city.clone(),
        garage_id: scope.garage_id,
        trained_at,
        feature_names,
        garage_columns,
        model,
        metrics: EvalMetrics::compute(&[], &[]),
    };

    let (predicted, actual): (Vec<f64>, Vec<f64>) = split
        .eval
        .iter()
        .map(|s| {
            let (occupied, _) = artifact.predict_occupied(s.location_id, s.observed_at, s.capacity);
            (occupied as f64, s.occupied as f64)
        })
        .unzip();
    artifact.metrics = EvalMetrics::compute(&predicted, &actual);

    tracing::info!(
        scope = %scope.label(),
        version = %artifact.version,
        n_train = split.train.len(),
        n_eval = split.eval.len(),
        mae = artifact.metrics.mae,
        rmse = artifact.metrics.rmse,
        r2 = artifact.metrics.r2,
        "Model trained",
    );

    Ok(TrainingOutcome {
        n_train: split.train.len(),
        n_eval: split.eval.len(),
        eval_boundary: split.boundary,
        excluded_garages,
        artifact,
    })
}
