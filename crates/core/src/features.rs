//! Time-based feature engineering.
//!
//! Hour-of-day and day-of-week are encoded cyclically so 23:00 sits next to
//! 00:00 and Sunday next to Monday.

use std::f64::consts::TAU;

use chrono::{Datelike, Timelike};

use crate::types::Timestamp;

/// Names of the time features, in vector order.
pub const TIME_FEATURE_NAMES: [&str; TIME_FEATURE_COUNT] = [
    "hour_sin",
    "hour_cos",
    "hour_sin_2",
    "hour_cos_2",
    "dow_sin",
    "dow_cos",
    "is_weekend",
    "weekend_hour_sin",
    "weekend_hour_cos",
];

pub const TIME_FEATURE_COUNT: usize = 9;

/// Calendar fields derived from an observation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarParts {
    pub hour: u32,
    /// 0 = Monday, 6 = Sunday.
    pub day_of_week: u32,
    pub is_weekend: bool,
}

pub fn calendar_parts(ts: Timestamp) -> CalendarParts {
    let day_of_week = ts.weekday().num_days_from_monday();
    CalendarParts {
        hour: ts.hour(),
        day_of_week,
        is_weekend: day_of_week >= 5,
    }
}

/// Cyclical time features for one timestamp.
pub fn time_features(ts: Timestamp) -> [f64; TIME_FEATURE_COUNT] {
    let parts = calendar_parts(ts);
    let hour = parts.hour as f64 + ts.minute() as f64 / 60.0;
    let hour_angle = TAU * hour / 24.0;
    let dow_angle = TAU * parts.day_of_week as f64 / 7.0;
    let weekend = if parts.is_weekend { 1.0 } else { 0.0 };

    [
        hour_angle.sin(),
        hour_angle.cos(),
        (2.0 * hour_angle).sin(),
        (2.0 * hour_angle).cos(),
        dow_angle.sin(),
        dow_angle.cos(),
        weekend,
        weekend * hour_angle.sin(),
        weekend * hour_angle.cos(),
    ]
}

/// Full feature vector: time features followed by a one-hot garage block.
///
/// `garage_column` is `None` for garage-scoped models and for garages the
/// model never saw; the one-hot block is then all zeros.
pub fn feature_vector(ts: Timestamp, garage_column: Option<usize>, garage_count: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(TIME_FEATURE_COUNT + garage_count);
    row.extend_from_slice(&time_features(ts));
    row.resize(TIME_FEATURE_COUNT + garage_count, 0.0);
    if let Some(col) = garage_column.filter(|c| *c < garage_count) {
        row[TIME_FEATURE_COUNT + col] = 1.0;
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn saturday_is_weekend() {
        // 2024-01-20 is a Saturday.
        let parts = calendar_parts(Utc.with_ymd_and_hms(2024, 1, 20, 10, 0, 0).unwrap());
        assert_eq!(parts.day_of_week, 5);
        assert!(parts.is_weekend);
        assert_eq!(parts.hour, 10);
    }

    #[test]
    fn monday_is_day_zero() {
        let parts = calendar_parts(Utc.with_ymd_and_hms(2024, 1, 22, 0, 0, 0).unwrap());
        assert_eq!(parts.day_of_week, 0);
        assert!(!parts.is_weekend);
    }

    #[test]
    fn midnight_and_late_evening_are_close() {
        let a = time_features(Utc.with_ymd_and_hms(2024, 1, 22, 0, 0, 0).unwrap());
        let b = time_features(Utc.with_ymd_and_hms(2024, 1, 22, 23, 30, 0).unwrap());
        let c = time_features(Utc.with_ymd_and_hms(2024, 1, 22, 12, 0, 0).unwrap());
        let dist = |x: &[f64], y: &[f64]| (x[0] - y[0]).hypot(x[1] - y[1]);
        assert!(dist(&a, &b) < dist(&a, &c));
    }

    #[test]
    fn weekday_interaction_terms_are_zero() {
        let f = time_features(Utc.with_ymd_and_hms(2024, 1, 23, 8, 0, 0).unwrap());
        assert_eq!(f[6], 0.0);
        assert_eq!(f[7], 0.0);
        assert_eq!(f[8], 0.0);
    }

    #[test]
    fn one_hot_block_sets_single_column() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 23, 8, 0, 0).unwrap();
        let row = feature_vector(ts, Some(2), 4);
        assert_eq!(row.len(), TIME_FEATURE_COUNT + 4);
        assert_eq!(&row[TIME_FEATURE_COUNT..], &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn unknown_garage_leaves_block_empty() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 23, 8, 0, 0).unwrap();
        let row = feature_vector(ts, None, 3);
        assert!(row[TIME_FEATURE_COUNT..].iter().all(|v| *v == 0.0));
    }
}
