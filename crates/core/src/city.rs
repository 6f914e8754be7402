//! Supported cities and their source payload shapes.
//!
//! Each city publishes occupancy through a different open-data portal:
//!
//! | City   | Records at          | Identity     | Capacity      | Occupancy              | Timestamp   |
//! |--------|---------------------|--------------|---------------|------------------------|-------------|
//! | Basel  | `results[]`         | `name`       | `total`       | `total - free`         | `published` |
//! | Aarhus | `result.records[]`  | `garageCode` | `totalSpaces` | `vehicleCount`         | `date`      |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::time::{parse_timestamp, truncate_to_seconds};
use crate::types::Timestamp;

/// Basel open-data endpoint (data.bs.ch dataset 100088).
pub const BASEL_API_URL: &str = "https://data.bs.ch/api/explore/v2.1/catalog/datasets/100088/records?select=published%2Clast_downloaded%2Cgeo_point_2d%2Cname%2Ctotal%2Cfree%2Cstatus%2Cid%2Caddress%2Clot_type%2Clink&limit=100&lang=de&timezone=Europe%2FZurich";

/// Aarhus open-data endpoint (opendata.dk parking resource).
pub const AARHUS_API_URL: &str = "https://admin.opendata.dk/api/action/datastore_search?resource_id=2a82a145-0195-4081-a13c-b0e587e9b89c";

/// Basel status value meaning the garage accepts vehicles.
const BASEL_STATUS_OPEN: &str = "offen";

/// A city whose parking data is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum City {
    Basel,
    Aarhus,
}

impl City {
    pub const ALL: [City; 2] = [City::Basel, City::Aarhus];

    /// Canonical name as stored in the `city` columns.
    pub fn as_str(self) -> &'static str {
        match self {
            City::Basel => "Basel",
            City::Aarhus => "Aarhus",
        }
    }

    /// Default public endpoint for this city.
    pub fn default_source_url(self) -> &'static str {
        match self {
            City::Basel => BASEL_API_URL,
            City::Aarhus => AARHUS_API_URL,
        }
    }

    /// Split a full API response into per-garage source records.
    pub fn source_records(self, response: &Value) -> Vec<Value> {
        let records = match self {
            City::Basel => response.get("results"),
            City::Aarhus => response.get("result").and_then(|r| r.get("records")),
        };
        records
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Extract the static garage identity from a source record.
    ///
    /// Returns `None` when the record has no usable garage name.
    pub fn identity(self, record: &Value) -> Option<GarageIdentity> {
        match self {
            City::Basel => {
                let name = non_empty_str(record.get("name"))?;
                let coords = record.get("geo_point_2d");
                Some(GarageIdentity {
                    name,
                    external_id: record.get("id").and_then(value_as_string),
                    address: non_empty_str(record.get("address")),
                    lot_type: non_empty_str(record.get("lot_type")),
                    url: non_empty_str(record.get("link")),
                    latitude: coords.and_then(|c| c.get("lat")).and_then(value_as_f64),
                    longitude: coords.and_then(|c| c.get("lon")).and_then(value_as_f64),
                    capacity: record.get("total").and_then(value_as_i64),
                })
            }
            City::Aarhus => {
                let name = non_empty_str(record.get("garageCode"))?;
                Some(GarageIdentity {
                    external_id: Some(name.clone()),
                    name,
                    address: None,
                    lot_type: None,
                    url: None,
                    latitude: None,
                    longitude: None,
                    capacity: record.get("totalSpaces").and_then(value_as_i64),
                })
            }
        }
    }

    /// Parse one source record into a canonical observation.
    ///
    /// The occupied count is returned as reported; range enforcement is the
    /// processor's job.
    pub fn parse_observation(self, record: &Value) -> Result<SourceObservation, CoreError> {
        let malformed = |reason: &str| CoreError::MalformedRecord {
            raw_id: None,
            reason: format!("{}: {reason}", self.as_str()),
        };

        let identity = self
            .identity(record)
            .ok_or_else(|| malformed("missing garage identity"))?;

        let ts_field = match self {
            City::Basel => "published",
            City::Aarhus => "date",
        };
        let observed_at = record
            .get(ts_field)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .map(truncate_to_seconds)
            .ok_or_else(|| malformed("missing or unparseable timestamp"))?;

        let capacity = identity
            .capacity
            .ok_or_else(|| malformed("missing capacity"))?;

        let (occupied, free_spaces, status) = match self {
            City::Basel => {
                let free = record
                    .get("free")
                    .and_then(value_as_i64)
                    .ok_or_else(|| malformed("missing free spaces"))?;
                let occupied = capacity
                    .checked_sub(free)
                    .ok_or_else(|| malformed("occupancy out of representable range"))?;
                (
                    occupied,
                    Some(free),
                    non_empty_str(record.get("status")),
                )
            }
            City::Aarhus => {
                let occupied = record
                    .get("vehicleCount")
                    .and_then(value_as_i64)
                    .ok_or_else(|| malformed("missing vehicle count"))?;
                let free = capacity
                    .checked_sub(occupied)
                    .ok_or_else(|| malformed("occupancy out of representable range"))?;
                (occupied, Some(free), None)
            }
        };

        let is_open = status.as_deref().map(|s| s.eq_ignore_ascii_case(BASEL_STATUS_OPEN));

        Ok(SourceObservation {
            garage_name: identity.name,
            observed_at,
            capacity,
            occupied,
            free_spaces,
            status,
            is_open,
        })
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for City {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        City::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown city '{s}'")))
    }
}

/// Static attributes of a garage as found in a source record.
#[derive(Debug, Clone, PartialEq)]
pub struct GarageIdentity {
    pub name: String,
    pub external_id: Option<String>,
    pub address: Option<String>,
    pub lot_type: Option<String>,
    pub url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
}

/// A single observation parsed out of a source record.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceObservation {
    pub garage_name: String,
    pub observed_at: Timestamp,
    pub capacity: i64,
    pub occupied: i64,
    pub free_spaces: Option<i64>,
    pub status: Option<String>,
    pub is_open: Option<bool>,
}

// ---------------------------------------------------------------------------
// Loose JSON accessors (portals mix numbers and numeric strings)
// ---------------------------------------------------------------------------

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_as_i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_as_i64))
        }
        _ => None,
    }
}

/// Rounds `f`; `None` when the result does not fit an `i64`.
fn float_as_i64(f: f64) -> Option<i64> {
    let rounded = f.round();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    (rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64)
        .then_some(rounded as i64)
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn basel_record() -> Value {
        json!({
            "published": "2024-01-19T15:00:00+01:00",
            "name": "Parkhaus Bahnhof Süd",
            "total": 1100,
            "free": 300,
            "status": "offen",
            "id": "bahnhofsued",
            "address": "Güterstrasse 115",
            "lot_type": "Parkhaus",
            "link": "https://www.parkleitsystem-basel.ch/parkhaus/bahnhofsued",
            "geo_point_2d": {"lat": 47.5468, "lon": 7.5929}
        })
    }

    #[test]
    fn city_from_str_is_case_insensitive() {
        assert_eq!("basel".parse::<City>().unwrap(), City::Basel);
        assert_eq!(" AARHUS ".parse::<City>().unwrap(), City::Aarhus);
        assert!("Zurich".parse::<City>().is_err());
    }

    #[test]
    fn basel_records_are_read_from_results() {
        let response = json!({"total_count": 2, "results": [basel_record(), basel_record()]});
        assert_eq!(City::Basel.source_records(&response).len(), 2);
        assert!(City::Aarhus.source_records(&response).is_empty());
    }

    #[test]
    fn aarhus_records_are_read_from_result_records() {
        let response = json!({"result": {"records": [{"garageCode": "NORREPORT"}]}});
        assert_eq!(City::Aarhus.source_records(&response).len(), 1);
    }

    #[test]
    fn basel_identity_carries_static_attributes() {
        let id = City::Basel.identity(&basel_record()).unwrap();
        assert_eq!(id.name, "Parkhaus Bahnhof Süd");
        assert_eq!(id.external_id.as_deref(), Some("bahnhofsued"));
        assert_eq!(id.capacity, Some(1100));
        assert_eq!(id.latitude, Some(47.5468));
        assert_eq!(id.lot_type.as_deref(), Some("Parkhaus"));
    }

    #[test]
    fn basel_observation_derives_occupied_from_free() {
        let obs = City::Basel.parse_observation(&basel_record()).unwrap();
        assert_eq!(obs.capacity, 1100);
        assert_eq!(obs.occupied, 800);
        assert_eq!(obs.free_spaces, Some(300));
        assert_eq!(obs.is_open, Some(true));
        assert_eq!(
            obs.observed_at,
            Utc.with_ymd_and_hms(2024, 1, 19, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn basel_accepts_numeric_strings() {
        let mut record = basel_record();
        record["total"] = json!("120");
        record["free"] = json!("20.0");
        let obs = City::Basel.parse_observation(&record).unwrap();
        assert_eq!(obs.capacity, 120);
        assert_eq!(obs.occupied, 100);
    }

    #[test]
    fn closed_status_is_not_open() {
        let mut record = basel_record();
        record["status"] = json!("geschlossen");
        let obs = City::Basel.parse_observation(&record).unwrap();
        assert_eq!(obs.is_open, Some(false));
    }

    #[test]
    fn aarhus_observation_uses_vehicle_count() {
        let record = json!({
            "garageCode": "NORREPORT",
            "totalSpaces": 80,
            "vehicleCount": 61,
            "date": "2014/05/22 09:09:04"
        });
        let obs = City::Aarhus.parse_observation(&record).unwrap();
        assert_eq!(obs.garage_name, "NORREPORT");
        assert_eq!(obs.occupied, 61);
        assert_eq!(obs.free_spaces, Some(19));
        assert_eq!(obs.is_open, None);
    }

    #[test]
    fn missing_identity_is_malformed() {
        let mut record = basel_record();
        record["name"] = json!("   ");
        assert_matches!(City::Basel.parse_observation(&record), Err(CoreError::MalformedRecord { .. }));
    }

    #[test]
    fn missing_timestamp_is_malformed() {
        let mut record = basel_record();
        record.as_object_mut().unwrap().remove("published");
        assert_matches!(City::Basel.parse_observation(&record), Err(CoreError::MalformedRecord { .. }));
    }

    #[test]
    fn unparseable_timestamp_is_malformed() {
        let mut record = basel_record();
        record["published"] = json!("yesterday");
        assert_matches!(City::Basel.parse_observation(&record), Err(CoreError::MalformedRecord { .. }));
    }

    #[test]
    fn missing_free_is_malformed() {
        let mut record = basel_record();
        record["free"] = Value::Null;
        assert_matches!(City::Basel.parse_observation(&record), Err(CoreError::MalformedRecord { .. }));
    }
}
