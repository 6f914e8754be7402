//! Parking location entity and upsert DTO.

use parkcast_core::city::{City, GarageIdentity};
use parkcast_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A known garage. Unique on `(city, name)`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ParkingLocation {
    pub id: DbId,
    pub city: String,
    pub name: String,
    /// Identifier used by the source API, when it has one.
    pub external_id: Option<String>,
    pub address: Option<String>,
    pub lot_type: Option<String>,
    pub url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting or refreshing a location.
///
/// `None` attributes leave the stored value untouched on conflict.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertLocation {
    pub city: String,
    pub name: String,
    pub external_id: Option<String>,
    pub address: Option<String>,
    pub lot_type: Option<String>,
    pub url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
}

impl UpsertLocation {
    pub fn from_identity(city: City, identity: GarageIdentity) -> Self {
        Self {
            city: city.as_str().to_owned(),
            name: identity.name,
            external_id: identity.external_id,
            address: identity.address,
            lot_type: identity.lot_type,
            url: identity.url,
            latitude: identity.latitude,
            longitude: identity.longitude,
            capacity: identity.capacity,
        }
    }
}
