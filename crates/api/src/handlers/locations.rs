use std::str::FromStr;

use axum::extract::{Query, State};
use axum::Json;
use parkcast_core::city::City;
use parkcast_db::models::location::ParkingLocation;

use crate::error::AppResult;
use crate::query::CityParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/locations?city=
pub async fn list_locations(
    State(state): State<AppState>,
    Query(params): Query<CityParams>,
) -> AppResult<Json<DataResponse<Vec<ParkingLocation>>>> {
    let city = params.city.as_deref().map(City::from_str).transpose()?;
    let locations = state
        .store
        .list_locations(city.map(City::as_str))
        .await?;
    Ok(Json(DataResponse { data: locations }))
}
