//! Trained model metadata.

use parkcast_core::artifact::ModelArtifact;
use parkcast_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// One row per trained model version. Unique on `(city, version)`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ModelMetadata {
    pub id: DbId,
    pub version: String,
    pub city: String,
    /// Set for garage-scoped models.
    pub garage_id: Option<DbId>,
    pub trained_at: Timestamp,
    pub n_train: i64,
    pub n_eval: i64,
    pub features: Json<Vec<String>>,
    pub mae: f64,
    pub rmse: f64,
    pub r2_score: f64,
    pub eval_boundary: Option<Timestamp>,
    /// Location of the serialised artifact.
    pub model_path: String,
    pub created_at: Timestamp,
}

/// DTO for recording a freshly trained model.
#[derive(Debug, Clone)]
pub struct NewModelMetadata {
    pub version: String,
    pub city: String,
    pub garage_id: Option<DbId>,
    pub trained_at: Timestamp,
    pub n_train: i64,
    pub n_eval: i64,
    pub features: Vec<String>,
    pub mae: f64,
    pub rmse: f64,
    pub r2_score: f64,
    pub eval_boundary: Option<Timestamp>,
    pub model_path: String,
    pub created_at: Timestamp,
}

impl NewModelMetadata {
    /// Metadata describing `artifact`, stored at `model_path`.
    pub fn for_artifact(
        artifact: &ModelArtifact,
        n_train: usize,
        n_eval: usize,
        eval_boundary: Option<Timestamp>,
        model_path: String,
        created_at: Timestamp,
    ) -> Self {
        Self {
            version: artifact.version.clone(),
            city: artifact.city.clone(),
            garage_id: artifact.garage_id,
            trained_at: artifact.trained_at,
            n_train: n_train as i64,
            n_eval: n_eval as i64,
            features: artifact.feature_names.clone(),
            mae: artifact.metrics.mae,
            rmse: artifact.metrics.rmse,
            r2_score: artifact.metrics.r2,
            eval_boundary,
            model_path,
            created_at,
        }
    }
}
