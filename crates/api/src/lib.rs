//! Parkcast API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! model registry) so integration tests and the binary entrypoint can both
//! access them.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod prediction;
pub mod query;
pub mod registry;
pub mod response;
pub mod router;
pub mod routes;
pub mod snapshot;
pub mod state;
