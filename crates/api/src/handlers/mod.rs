pub mod dashboard;
pub mod locations;
pub mod models;
pub mod predict;
