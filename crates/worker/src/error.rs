use parkcast_core::error::CoreError;
use parkcast_db::StoreError;

/// Failure to retrieve a city feed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The source returned a non-2xx status code.
    #[error("{url} returned HTTP {status}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    /// Timeouts, connection failures, 429 and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Error type for worker jobs.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl JobError {
    /// Whether the failure is expected to clear up on the next run.
    pub fn is_transient(&self) -> bool {
        match self {
            JobError::Fetch(e) => e.is_transient(),
            JobError::Store(e) => e.is_unavailable(),
            JobError::Core(e) => e.is_retryable(),
        }
    }
}
