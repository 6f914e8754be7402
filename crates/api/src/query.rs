//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Optional `?city=` filter.
#[derive(Debug, Default, Deserialize)]
pub struct CityParams {
    pub city: Option<String>,
}

/// `?garage=&from=&to=&limit=` for the history endpoint.
///
/// Timestamps are kept as strings so unparseable values become a 400 with a
/// useful message instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub garage: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
}

/// `?hours=&limit=` for the recent-predictions endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PredictionWindowParams {
    pub hours: Option<i64>,
    pub limit: Option<i64>,
}
