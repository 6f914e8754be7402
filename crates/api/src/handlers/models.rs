use std::str::FromStr;

use axum::extract::{Query, State};
use axum::Json;
use parkcast_core::city::City;
use parkcast_db::models::model_metadata::ModelMetadata;

use crate::error::AppResult;
use crate::query::CityParams;
use crate::registry::ActiveModel;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/models?city=
///
/// Every recorded model version, newest first.
pub async fn list_models(
    State(state): State<AppState>,
    Query(params): Query<CityParams>,
) -> AppResult<Json<DataResponse<Vec<ModelMetadata>>>> {
    let city = params.city.as_deref().map(City::from_str).transpose()?;
    let models = state.store.list_models(city.map(City::as_str)).await?;
    Ok(Json(DataResponse { data: models }))
}

/// GET /api/v1/models/active
///
/// Versions the prediction service is serving right now.
pub async fn active_models(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<ActiveModel>>>> {
    Ok(Json(DataResponse {
        data: state.models.active_models().await,
    }))
}
