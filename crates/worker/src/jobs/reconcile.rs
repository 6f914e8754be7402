//! Accuracy tracking: attach observed occupancy to past predictions.

use chrono::Duration;
use parkcast_core::city::City;
use parkcast_core::types::Timestamp;
use parkcast_db::ParkingStore;

use crate::error::JobError;

/// How far, in minutes, an observation may lie from a prediction's target time.
pub const DEFAULT_MATCH_TOLERANCE_MINUTES: i64 = 15;

/// Predictions examined per run.
const BATCH_LIMIT: i64 = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Predictions whose target time has passed without an actual.
    pub pending: usize,
    pub reconciled: usize,
    /// Pending predictions with no observation near their target time.
    pub unmatched: usize,
}

/// Fill `actual_occupied` and `prediction_error` for predictions of `city`
/// targeting times before `now`.
///
/// `prediction_error` is predicted minus actual, in spaces.
pub async fn run_reconcile(
    store: &dyn ParkingStore,
    city: City,
    now: Timestamp,
    tolerance: Duration,
) -> Result<ReconcileReport, JobError> {
    let pending = store
        .pending_predictions(city.as_str(), now, BATCH_LIMIT)
        .await?;

    let mut report = ReconcileReport {
        pending: pending.len(),
        ..Default::default()
    };
    for prediction in &pending {
        let observed = store
            .processed_near(prediction.location_id, prediction.target_time, tolerance)
            .await?;
        let Some(observed) = observed else {
            report.unmatched += 1;
            continue;
        };
        let error = (prediction.predicted_occupied - observed.occupied) as f64;
        if store
            .record_actual(prediction.id, observed.occupied, error)
            .await?
        {
            report.reconciled += 1;
        }
    }

    tracing::info!(
        city = %city,
        pending = report.pending,
        reconciled = report.reconciled,
        unmatched = report.unmatched,
        "Reconciled predictions",
    );
    Ok(report)
}
