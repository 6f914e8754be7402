//! Persistence for parkcast.
//!
//! The `DATABASE_URL` scheme picks the backend: `sqlite:` URLs open (and
//! create) a local database file, `postgres:` / `postgresql:` URLs connect to
//! PostgreSQL. Callers only ever see `Arc<dyn ParkingStore>`.

pub mod error;
pub mod models;
pub mod store;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub use error::StoreError;
pub use store::{Backend, ParkingStore, PgStore, SqliteStore};

/// Used when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/parking.db";

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to whichever backend is configured.
pub type DbStore = Arc<dyn ParkingStore>;

/// Which backend a URL selects, if any.
pub fn backend_for_url(database_url: &str) -> Option<Backend> {
    if database_url.starts_with("sqlite:") {
        Some(Backend::Sqlite)
    } else if database_url.starts_with("postgres:") || database_url.starts_with("postgresql:") {
        Some(Backend::Postgres)
    } else {
        None
    }
}

/// Create a connection pool for `database_url` and wrap it in a store.
pub async fn create_store(database_url: &str) -> Result<DbStore, StoreError> {
    match backend_for_url(database_url) {
        Some(Backend::Sqlite) => {
            let options = SqliteConnectOptions::from_str(database_url)?
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(ACQUIRE_TIMEOUT);
            ensure_parent_dir(options.get_filename())?;
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?;
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        Some(Backend::Postgres) => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .connect(database_url)
                .await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => Err(StoreError::UnsupportedUrl(redact(database_url))),
    }
}

/// Connect, verify connectivity and apply pending migrations.
///
/// This is the only storage step whose failure is fatal at startup.
pub async fn connect_and_migrate(database_url: &str) -> Result<DbStore, StoreError> {
    let store = create_store(database_url).await?;
    store.ping().await?;
    store.run_migrations().await?;
    tracing::info!(backend = store.backend().as_str(), "Database ready");
    Ok(store)
}

/// Returns `true` if the store answers a trivial query.
pub async fn health_check(store: &dyn ParkingStore) -> bool {
    match store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    }
}

fn ensure_parent_dir(file: &Path) -> Result<(), StoreError> {
    let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if file.as_os_str() == ":memory:" || parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(sqlx::Error::Io(e)))
}

/// Strip credentials from a URL before it ends up in an error message.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_owned(),
    }
}
