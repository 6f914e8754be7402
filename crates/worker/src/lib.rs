//! Parkcast batch worker.
//!
//! Fetches city feeds into the raw store, processes them into observations,
//! trains occupancy models and reconciles logged predictions against what
//! was later observed. Every job is available as a CLI subcommand and all of
//! them run together under the [`scheduler`].

pub mod cli;
pub mod error;
pub mod fetcher;
pub mod jobs;
pub mod scheduler;
