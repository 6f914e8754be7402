//! Batch jobs over the parking store.
//!
//! Each job is a free function taking the store and its inputs, so the CLI
//! and the [`scheduler`](crate::scheduler) share one implementation. Writes
//! go through [`STORE_RETRY`] so a briefly unreachable database does not
//! fail a whole run.

pub mod fetch;
pub mod process;
pub mod reconcile;
pub mod train;

use std::time::Duration;

use parkcast_core::retry::RetryPolicy;

pub use fetch::{run_fetch, FetchReport};
pub use process::{run_process, ProcessReport};
pub use reconcile::{run_reconcile, ReconcileReport, DEFAULT_MATCH_TOLERANCE_MINUTES};
pub use train::{run_train, TrainReport};

/// Retry budget for store writes.
pub const STORE_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_millis(500),
    max_delay: Duration::from_secs(5),
};
