use std::sync::Arc;

use parkcast_db::DbStore;

use crate::config::ServerConfig;
use crate::registry::ModelRegistry;
use crate::snapshot::SnapshotCache;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Storage backend selected by `DATABASE_URL`.
    pub store: DbStore,
    pub config: Arc<ServerConfig>,
    /// Active model per city.
    pub models: Arc<ModelRegistry>,
    /// Last-known dashboard payloads for storage outages.
    pub snapshots: Arc<SnapshotCache>,
}

impl AppState {
    pub fn new(store: DbStore, config: ServerConfig) -> Self {
        let models = Arc::new(ModelRegistry::new(
            Arc::clone(&store),
            config.model_dir.clone(),
            config.model_version.clone(),
        ));
        let snapshots = Arc::new(SnapshotCache::new(config.snapshot_dir.clone()));
        Self {
            store,
            config: Arc::new(config),
            models,
            snapshots,
        }
    }
}
