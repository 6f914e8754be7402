//! In-process cache of the active model per city.
//!
//! Handlers take an `Arc<ModelArtifact>` snapshot and use it for the whole
//! request, so a refresh that swaps in a newer version never changes the
//! model under an in-flight prediction. When storage or the artifact file
//! cannot be read, the previously cached model keeps serving.
//!
//! Absolute artifact paths are read as recorded. A relative path was written
//! relative to the trainer's working directory, so only its file name is
//! kept and it is looked up inside this process's model directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parkcast_core::artifact::ModelArtifact;
use parkcast_core::city::City;
use parkcast_core::error::CoreError;
use parkcast_db::models::model_metadata::ModelMetadata;
use parkcast_db::DbStore;
use serde::Serialize;
use tokio::sync::RwLock;

/// A city's active model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveModel {
    pub city: String,
    pub version: String,
    pub trained_at: parkcast_core::types::Timestamp,
}

pub struct ModelRegistry {
    store: DbStore,
    model_dir: PathBuf,
    /// When set, only this version is ever loaded.
    pinned_version: Option<String>,
    models: RwLock<HashMap<City, Arc<ModelArtifact>>>,
}

impl ModelRegistry {
    pub fn new(store: DbStore, model_dir: PathBuf, pinned_version: Option<String>) -> Self {
        Self {
            store,
            model_dir,
            pinned_version,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// The model to serve for `city`, loading it on first use.
    pub async fn current(&self, city: City) -> Result<Arc<ModelArtifact>, CoreError> {
        if let Some(model) = self.cached(city).await {
            return Ok(model);
        }
        self.refresh(city).await?.ok_or_else(|| {
            let what = match &self.pinned_version {
                Some(v) => format!("pinned version {v} not found for {city}"),
                None => format!("no model has been trained for {city}"),
            };
            CoreError::ModelUnavailable(what)
        })
    }

    pub async fn cached(&self, city: City) -> Option<Arc<ModelArtifact>> {
        self.models.read().await.get(&city).cloned()
    }

    /// Versions currently cached, ordered by city.
    pub async fn active_models(&self) -> Vec<ActiveModel> {
        let models = self.models.read().await;
        City::ALL
            .iter()
            .filter_map(|city| models.get(city))
            .map(|m| ActiveModel {
                city: m.city.clone(),
                version: m.version.clone(),
                trained_at: m.trained_at,
            })
            .collect()
    }

    /// Check storage for a newer (or pinned) version of `city`'s model and
    /// swap it in. Returns whatever model is active afterwards.
    ///
    /// Storage errors only surface when nothing is cached yet.
    pub async fn refresh(&self, city: City) -> Result<Option<Arc<ModelArtifact>>, CoreError> {
        let cached = self.cached(city).await;

        let lookup = match &self.pinned_version {
            Some(version) => self.store.get_model(city.as_str(), version).await,
            None => self.store.latest_model(city.as_str()).await,
        };
        let metadata = match lookup {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return Ok(cached),
            Err(e) => {
                if cached.is_some() {
                    tracing::warn!(city = %city, error = %e, "Model lookup failed, serving cached model");
                    return Ok(cached);
                }
                return Err(e.into());
            }
        };

        if cached.as_ref().is_some_and(|m| m.version == metadata.version) {
            return Ok(cached);
        }

        match load_artifact(&self.artifact_path(&metadata.model_path), &metadata).await {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                let previous = self
                    .models
                    .write()
                    .await
                    .insert(city, Arc::clone(&artifact));
                tracing::info!(
                    city = %city,
                    version = %artifact.version,
                    previous = previous.as_ref().map(|m| m.version.as_str()),
                    "Activated model",
                );
                Ok(Some(artifact))
            }
            Err(e) if cached.is_some() => {
                tracing::warn!(city = %city, version = %metadata.version, error = %e, "Cannot load model, serving cached model");
                Ok(cached)
            }
            Err(e) => Err(e),
        }
    }

    /// Where the artifact recorded as `model_path` is read from.
    pub fn artifact_path(&self, model_path: &str) -> PathBuf {
        let recorded = Path::new(model_path);
        if recorded.is_absolute() {
            return recorded.to_path_buf();
        }
        match recorded.file_name() {
            Some(name) => self.model_dir.join(name),
            None => self.model_dir.join(recorded),
        }
    }

    /// Refresh every city, logging failures.
    pub async fn refresh_all(&self) {
        for city in City::ALL {
            if let Err(e) = self.refresh(city).await {
                tracing::debug!(city = %city, error = %e, "Model refresh skipped");
            }
        }
    }
}

async fn load_artifact(path: &Path, metadata: &ModelMetadata) -> Result<ModelArtifact, CoreError> {
    let path = path.to_path_buf();
    let artifact = tokio::task::spawn_blocking(move || ModelArtifact::load(&path))
        .await
        .map_err(|e| CoreError::Internal(format!("model loader panicked: {e}")))??;
    if artifact.version != metadata.version {
        return Err(CoreError::ModelUnavailable(format!(
            "artifact {} holds version {}, expected {}",
            metadata.model_path, artifact.version, metadata.version
        )));
    }
    Ok(artifact)
}
