//! Parkcast domain core.
//!
//! Pure domain logic shared by the API server and the batch worker: city
//! source parsing, the raw-to-processed transformation, feature engineering,
//! the regression model and its serialised artifact.

pub mod artifact;
pub mod city;
pub mod error;
pub mod features;
pub mod processing;
pub mod regression;
pub mod retry;
pub mod time;
pub mod training;
pub mod types;
