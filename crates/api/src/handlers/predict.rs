use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::prediction::{self, PredictRequest, PredictResponse};
use crate::state::AppState;

/// POST /predict
///
/// Body `{garage, datetime, city?}`. Malformed JSON is a 400 like any other
/// invalid input.
///
/// The response `datetime` is the normalised target actually predicted for:
/// UTC, whole seconds, RFC 3339 (`2024-03-11T15:00:00.5+01:00` comes back as
/// `2024-03-11T14:00:00Z`), not an echo of the request string.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> AppResult<Json<PredictResponse>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let response = prediction::predict(&state, request).await?;
    Ok(Json(response))
}
