//! Column lists shared by both backends.
//!
//! Queries use `$N` placeholders, which PostgreSQL and SQLite both accept.

/// Column list for `parking_locations` SELECT queries.
pub(super) const LOCATION_COLUMNS: &str = "\
    id, city, name, external_id, address, lot_type, url, \
    latitude, longitude, capacity, is_active, created_at, updated_at";

pub(super) const RAW_COLUMNS: &str = "id, location_id, city, fetched_at, payload";

/// Column list for `processed_parking_data` SELECT queries.
pub(super) const PROCESSED_COLUMNS: &str = "\
    id, location_id, raw_id, city, garage_name, observed_at, \
    capacity, occupied, free_spaces, occupancy_ratio, \
    hour, day_of_week, is_weekend, status, is_open, processed_at";

/// Column list for `processed_parking_data` INSERT statements (excludes `id`).
pub(super) const PROCESSED_INSERT_COLUMNS: &str = "\
    location_id, raw_id, city, garage_name, observed_at, \
    capacity, occupied, free_spaces, occupancy_ratio, \
    hour, day_of_week, is_weekend, status, is_open, processed_at";

pub(super) const PREDICTION_COLUMNS: &str = "\
    id, location_id, city, garage_name, target_time, \
    predicted_occupied, predicted_ratio, capacity, model_version, model_mae, \
    actual_occupied, prediction_error, created_at";

pub(super) const PREDICTION_INSERT_COLUMNS: &str = "\
    location_id, city, garage_name, target_time, \
    predicted_occupied, predicted_ratio, capacity, model_version, model_mae, \
    created_at";

pub(super) const MODEL_COLUMNS: &str = "\
    id, version, city, garage_id, trained_at, n_train, n_eval, features, \
    mae, rmse, r2_score, eval_boundary, model_path, created_at";

pub(super) const MODEL_INSERT_COLUMNS: &str = "\
    version, city, garage_id, trained_at, n_train, n_eval, features, \
    mae, rmse, r2_score, eval_boundary, model_path, created_at";
