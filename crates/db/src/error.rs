use parkcast_core::error::CoreError;

/// Errors raised by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be reached (connect, pool or I/O failure).
    #[error("Database unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// The database answered with an error.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Unsupported database URL: {0}")]
    UnsupportedUrl(String),
}

impl StoreError {
    /// Whether the failure is a connectivity problem worth retrying.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Unique or check constraint violation reported by the database.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => matches!(
                db_err.kind(),
                sqlx::error::ErrorKind::UniqueViolation
                    | sqlx::error::ErrorKind::CheckViolation
                    | sqlx::error::ErrorKind::ForeignKeyViolation
            ),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err),
            other => StoreError::Database(other),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(e) => CoreError::StorageUnavailable(e.to_string()),
            other => CoreError::Internal(other.to_string()),
        }
    }
}
