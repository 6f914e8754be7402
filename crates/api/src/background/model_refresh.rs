//! Periodic model refresh.
//!
//! Polls model metadata on a fixed interval so a retrain performed by the
//! worker is picked up without restarting the server.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::ModelRegistry;

/// Run the refresh loop until `cancel` is triggered.
pub async fn run(registry: Arc<ModelRegistry>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Model refresh job started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Model refresh job stopping");
                break;
            }
            _ = interval.tick() => {
                registry.refresh_all().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkcast_db::{DbStore, SqliteStore};
    use sqlx::SqlitePool;

    #[sqlx::test(migrations = "../../db/migrations/sqlite")]
    async fn stops_when_cancelled(pool: SqlitePool) {
        let store: DbStore = Arc::new(SqliteStore::new(pool));
        let registry = Arc::new(ModelRegistry::new(store, std::path::PathBuf::from("models"), None));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(registry, Duration::from_millis(10), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresh loop did not stop")
            .unwrap();
    }
}
