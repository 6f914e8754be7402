//! Serialised model artifact.
//!
//! An artifact is everything the prediction service needs to turn a
//! `(garage, timestamp)` pair into an occupancy estimate. It is written once
//! by the trainer as JSON and never modified afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::features::feature_vector;
use crate::regression::{EvalMetrics, RidgeRegression};
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub city: String,
    /// Set for garage-scoped models.
    pub garage_id: Option<DbId>,
    pub trained_at: Timestamp,
    pub feature_names: Vec<String>,
    /// Column of each garage inside the one-hot block.
    pub garage_columns: BTreeMap<DbId, usize>,
    pub model: RidgeRegression,
    pub metrics: EvalMetrics,
}

impl ModelArtifact {
    /// Predicted occupancy ratio in `[0, 1]`.
    pub fn predict_ratio(&self, location_id: DbId, at: Timestamp) -> f64 {
        let column = self.garage_columns.get(&location_id).copied();
        let row = feature_vector(at, column, self.garage_columns.len());
        let ratio = self.model.predict(&row);
        if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Predicted occupied spaces in `[0, capacity]`, with the ratio used.
    pub fn predict_occupied(&self, location_id: DbId, at: Timestamp, capacity: i64) -> (i64, f64) {
        let ratio = self.predict_ratio(location_id, at);
        let capacity = capacity.max(0);
        let occupied = ((ratio * capacity as f64).round() as i64).clamp(0, capacity);
        (occupied, ratio)
    }

    /// File name used under the model directory.
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.city.to_lowercase(), self.version)
    }

    /// Write the artifact into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, CoreError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            CoreError::Internal(format!("cannot create model dir {}: {e}", dir.display()))
        })?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| CoreError::Internal(format!("cannot serialise model: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| CoreError::Internal(format!("cannot write {}: {e}", path.display())))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let bytes = std::fs::read(path).map_err(|e| {
            CoreError::ModelUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            CoreError::ModelUnavailable(format!("corrupt artifact {}: {e}", path.display()))
        })
    }
}

/// Monotonic version string derived from the training time.
pub fn version_for(trained_at: Timestamp) -> String {
    trained_at.format("%Y%m%dT%H%M%S%3f").to_string()
}
