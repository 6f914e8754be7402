//! Raw-to-processed transformation.
//!
//! Turns stored raw source records into canonical [`Observation`]s:
//!
//! 1. Records without a resolved garage, timestamp or occupancy figures are
//!    reported as malformed and skipped.
//! 2. Out-of-range occupancy is **clamped** into `[0, capacity]`. Records with
//!    a non-positive capacity cannot be clamped and are malformed.
//! 3. Observations are deduplicated on `(location_id, observed_at)`; the one
//!    from the latest fetch wins (ties broken by the higher raw id).
//!
//! The output is sorted by `(location_id, observed_at)` so re-processing the
//! same input yields an identical batch.

use std::collections::HashMap;

use serde_json::Value;

use crate::city::City;
use crate::error::CoreError;
use crate::features::calendar_parts;
use crate::types::{DbId, Timestamp};

/// One stored raw record handed to the processor.
#[derive(Debug, Clone, Copy)]
pub struct RawInput<'a> {
    pub raw_id: DbId,
    pub location_id: Option<DbId>,
    pub fetched_at: Timestamp,
    pub payload: &'a Value,
}

/// A canonical, validated occupancy observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub location_id: DbId,
    pub raw_id: DbId,
    pub city: String,
    pub garage_name: String,
    pub observed_at: Timestamp,
    pub fetched_at: Timestamp,
    pub capacity: i64,
    pub occupied: i64,
    pub free_spaces: i64,
    pub occupancy_ratio: f64,
    pub hour: i64,
    pub day_of_week: i64,
    pub is_weekend: bool,
    pub status: Option<String>,
    pub is_open: Option<bool>,
}

/// Result of one processing pass.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub observations: Vec<Observation>,
    /// Always [`CoreError::MalformedRecord`] values.
    pub malformed: Vec<CoreError>,
    pub clamped: usize,
    pub duplicates: usize,
}

/// Clamp an occupied count into `[0, capacity]`.
///
/// Returns the clamped value and whether clamping changed it.
pub fn clamp_occupied(occupied: i64, capacity: i64) -> (i64, bool) {
    let clamped = occupied.clamp(0, capacity.max(0));
    (clamped, clamped != occupied)
}

/// Process raw records for one city.
pub fn process(city: City, inputs: &[RawInput<'_>]) -> ProcessOutcome {
    let mut outcome = ProcessOutcome::default();
    let mut latest: HashMap<(DbId, Timestamp), Observation> = HashMap::new();

    for input in inputs {
        match normalise(city, input) {
            Ok((obs, was_clamped)) => {
                if was_clamped {
                    outcome.clamped += 1;
                }
                let key = (obs.location_id, obs.observed_at);
                let replaces = latest.get(&key).map(|current| supersedes(&obs, current));
                match replaces {
                    Some(false) => outcome.duplicates += 1,
                    Some(true) => {
                        outcome.duplicates += 1;
                        latest.insert(key, obs);
                    }
                    None => {
                        latest.insert(key, obs);
                    }
                }
            }
            Err(err) => {
                tracing::warn!(city = %city, raw_id = input.raw_id, error = %err, "Skipping malformed record");
                outcome.malformed.push(err);
            }
        }
    }

    let mut observations: Vec<Observation> = latest.into_values().collect();
    observations.sort_by(|a, b| {
        a.location_id
            .cmp(&b.location_id)
            .then(a.observed_at.cmp(&b.observed_at))
    });
    outcome.observations = observations;
    outcome
}

/// Whether `candidate` comes from a later fetch than `current`.
fn supersedes(candidate: &Observation, current: &Observation) -> bool {
    (candidate.fetched_at, candidate.raw_id) > (current.fetched_at, current.raw_id)
}

fn normalise(city: City, input: &RawInput<'_>) -> Result<(Observation, bool), CoreError> {
    let with_raw_id = |err: CoreError| match err {
        CoreError::MalformedRecord { reason, .. } => CoreError::MalformedRecord {
            raw_id: Some(input.raw_id),
            reason,
        },
        other => other,
    };

    let location_id = input.location_id.ok_or_else(|| CoreError::MalformedRecord {
        raw_id: Some(input.raw_id),
        reason: format!("{city}: record has no garage reference"),
    })?;

    let source = city.parse_observation(input.payload).map_err(with_raw_id)?;

    if source.capacity <= 0 {
        return Err(CoreError::MalformedRecord {
            raw_id: Some(input.raw_id),
            reason: format!("{city}: non-positive capacity {}", source.capacity),
        });
    }

    let (occupied, was_clamped) = clamp_occupied(source.occupied, source.capacity);
    let parts = calendar_parts(source.observed_at);

    let observation = Observation {
        location_id,
        raw_id: input.raw_id,
        city: city.as_str().to_owned(),
        garage_name: source.garage_name,
        observed_at: source.observed_at,
        fetched_at: input.fetched_at,
        capacity: source.capacity,
        occupied,
        free_spaces: source.capacity - occupied,
        occupancy_ratio: occupied as f64 / source.capacity as f64,
        hour: i64::from(parts.hour),
        day_of_week: i64::from(parts.day_of_week),
        is_weekend: parts.is_weekend,
        status: source.status,
        is_open: source.is_open,
    };
    Ok((observation, was_clamped))
}
