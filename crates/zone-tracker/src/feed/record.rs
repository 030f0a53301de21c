// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-record validation for the GeoFS multiplayer map feed.
//!
//! Record layout:
//! ```text
//! { "id": .., "acid": .., "cs": "<callsign>", "ac": <type id>,
//!   "co": [lat, lon, altitude_m, heading, ...], "st": { "as": <knots> } }
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::geo::{initial_bearing, normalize_heading, GeoPoint};
use crate::tracker::Entity;

pub const ALTITUDE_FEET_PER_METER: f64 = 3.280_84;
/// Minimum movement (|dlat| + |dlon|, degrees) before a bearing is derived
/// from consecutive positions.
pub const HEADING_MOVE_EPSILON_DEG: f64 = 1e-5;

const MIN_POSITION_FIELDS: usize = 4;

/// Why a record was discarded.
#[derive(Debug, Error, PartialEq)]
pub enum Rejection {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing position array")]
    MissingPosition,

    #[error("position array has {0} fields, need at least 4")]
    ShortPosition(usize),

    #[error("latitude/longitude is not a finite number")]
    NonNumericPosition,

    #[error("position ({lat}, {lon}) out of range")]
    OutOfRange { lat: f64, lon: f64 },

    #[error("missing or empty callsign")]
    MissingCallsign,
}

/// A validated record, not yet merged with prior entity state.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    /// False when the id had to be generated; such entities cannot be
    /// matched across cycles.
    pub stable_id: bool,
    pub callsign: String,
    pub position: GeoPoint,
    pub altitude_m: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub aircraft_type: Option<String>,
}

impl RawRecord {
    /// Validate one raw record. Never panics on arbitrary JSON.
    pub fn parse(value: &Value) -> Result<Self, Rejection> {
        let obj = value.as_object().ok_or(Rejection::NotAnObject)?;

        let co = obj
            .get("co")
            .and_then(Value::as_array)
            .ok_or(Rejection::MissingPosition)?;
        if co.len() < MIN_POSITION_FIELDS {
            return Err(Rejection::ShortPosition(co.len()));
        }

        let (Some(lat), Some(lon)) = (finite(&co[0]), finite(&co[1])) else {
            return Err(Rejection::NonNumericPosition);
        };
        let position = GeoPoint::new(lat, lon);
        if !position.is_valid() {
            return Err(Rejection::OutOfRange { lat, lon });
        }

        let callsign = obj
            .get("cs")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|cs| !cs.is_empty())
            .ok_or(Rejection::MissingCallsign)?
            .to_string();

        let (id, stable_id) = match identity(obj) {
            Some(id) => (id, true),
            None => (Uuid::new_v4().to_string(), false),
        };

        Ok(Self {
            id,
            stable_id,
            callsign,
            position,
            altitude_m: finite(&co[2]),
            heading: finite(&co[3]),
            speed: obj.get("st").and_then(|st| st.get("as")).and_then(finite),
            aircraft_type: obj.get("ac").and_then(scalar_string),
        })
    }

    /// Merge with the entity's previous state.
    ///
    /// Altitude is converted from metres to feet here and nowhere else.
    /// Heading prefers the reported value, then a bearing derived from the
    /// previous position if the entity moved, then the previous heading.
    /// Missing descriptive fields keep their last known value.
    #[must_use]
    pub fn into_entity(self, prior: Option<&Entity>, now: DateTime<Utc>) -> Entity {
        let heading = match (self.heading, prior) {
            (Some(h), _) => Some(normalize_heading(h)),
            (None, Some(prev)) => {
                let moved = (self.position.lat - prev.position.lat).abs()
                    + (self.position.lon - prev.position.lon).abs();
                if moved > HEADING_MOVE_EPSILON_DEG {
                    Some(initial_bearing(prev.position, self.position))
                } else {
                    prev.heading
                }
            }
            (None, None) => None,
        };

        Entity {
            id: self.id,
            callsign: self.callsign,
            position: self.position,
            heading,
            altitude: self
                .altitude_m
                .map(meters_to_feet)
                .or_else(|| prior.and_then(|p| p.altitude)),
            speed: self.speed.or_else(|| prior.and_then(|p| p.speed)),
            aircraft_type: self
                .aircraft_type
                .or_else(|| prior.and_then(|p| p.aircraft_type.clone())),
            last_seen: now,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "altitudes are far inside i32 range after rounding"
)]
fn meters_to_feet(meters: f64) -> i32 {
    (meters * ALTITUDE_FEET_PER_METER).round() as i32
}

fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// Strings and numbers become identifiers; anything else does not.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Primary `id`, falling back to `acid`. Only strings and numbers count as
/// ids; zero, empty strings and any other JSON type (booleans included) are
/// treated as absent.
fn identity(obj: &Map<String, Value>) -> Option<String> {
    ["id", "acid"].iter().find_map(|key| {
        obj.get(*key)
            .filter(|v| v.as_f64() != Some(0.0))
            .and_then(scalar_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: &Value) -> RawRecord {
        RawRecord::parse(value).unwrap()
    }

    #[test]
    fn test_parse_full_record() {
        let r = record(&json!({
            "id": 4242, "acid": 99, "cs": "  Falcon1[IAF] ", "ac": 10,
            "co": [28.6, 77.2, 1000.0, 45.0, 0.0], "st": {"as": 250.0}
        }));
        assert_eq!(r.id, "4242");
        assert!(r.stable_id);
        assert_eq!(r.callsign, "Falcon1[IAF]");
        assert_eq!(r.position, GeoPoint::new(28.6, 77.2));
        assert_eq!(r.heading, Some(45.0));
        assert_eq!(r.speed, Some(250.0));
        assert_eq!(r.aircraft_type.as_deref(), Some("10"));
    }

    #[test]
    fn test_rejections() {
        let cases = [
            (json!("nope"), Rejection::NotAnObject),
            (json!({"cs": "A"}), Rejection::MissingPosition),
            (json!({"cs": "A", "co": [1.0, 2.0, 3.0]}), Rejection::ShortPosition(3)),
            (json!({"cs": "A", "co": ["1", 2.0, 0, 0]}), Rejection::NonNumericPosition),
            (json!({"cs": "A", "co": [null, 2.0, 0, 0]}), Rejection::NonNumericPosition),
            (json!({"cs": "A", "co": [91.0, 2.0, 0, 0]}), Rejection::OutOfRange { lat: 91.0, lon: 2.0 }),
            (json!({"cs": "A", "co": [1.0, -180.5, 0, 0]}), Rejection::OutOfRange { lat: 1.0, lon: -180.5 }),
            (json!({"cs": "   ", "co": [1.0, 2.0, 0, 0]}), Rejection::MissingCallsign),
            (json!({"cs": 7, "co": [1.0, 2.0, 0, 0]}), Rejection::MissingCallsign),
            (json!({"co": [1.0, 2.0, 0, 0]}), Rejection::MissingCallsign),
        ];
        for (value, expected) in cases {
            assert_eq!(RawRecord::parse(&value), Err(expected), "{value}");
        }
    }

    #[test]
    fn test_identity_fallbacks() {
        let by_acid = record(&json!({"id": 0, "acid": "abc", "cs": "A", "co": [1, 2, 0, 0]}));
        assert_eq!(by_acid.id, "abc");
        assert!(by_acid.stable_id);

        let by_empty = record(&json!({"id": "", "acid": 17, "cs": "A", "co": [1, 2, 0, 0]}));
        assert_eq!(by_empty.id, "17");

        let by_bool = record(&json!({"id": true, "acid": "xyz", "cs": "A", "co": [1, 2, 0, 0]}));
        assert_eq!(by_bool.id, "xyz");
        let bool_only = record(&json!({"id": true, "cs": "A", "co": [1, 2, 0, 0]}));
        assert!(!bool_only.stable_id);

        let a =record(&json!({"cs": "A", "co": [1, 2, 0, 0]}));
        let b = record(&json!({"cs": "A", "co": [1, 2, 0, 0]}));
        assert!(!a.stable_id);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_altitude_converted_to_feet() {
        let entity = record(&json!({"id": 1, "cs": "A", "co": [1, 2, 1000.0, 0]}))
            .into_entity(None, Utc::now());
        assert_eq!(entity.altitude, Some(3281));
    }

    #[test]
    fn test_reported_heading_is_normalized() {
        let entity = record(&json!({"id": 1, "cs": "A", "co": [1, 2, 0, -90.0]}))
            .into_entity(None, Utc::now());
        assert_eq!(entity.heading, Some(270.0));
    }

    #[test]
    fn test_heading_derived_from_movement() {
        let prior = record(&json!({"id": 1, "cs": "A", "co": [0.0, 0.0, 0, 10.0]}))
            .into_entity(None, Utc::now());
        let moved = record(&json!({"id": 1, "cs": "A", "co": [0.0, 1.0, 0, null]}))
            .into_entity(Some(&prior), Utc::now());
        let heading = moved.heading.unwrap();
        assert!((heading - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_heading_kept_when_stationary() {
        let prior = record(&json!({"id": 1, "cs": "A", "co": [5.0, 5.0, 0, 123.0]}))
            .into_entity(None, Utc::now());
        let still = record(&json!({"id": 1, "cs": "A", "co": [5.0, 5.000_001, 0, null]}))
            .into_entity(Some(&prior), Utc::now());
        assert_eq!(still.heading, Some(123.0));

        let fresh = record(&json!({"id": 2, "cs": "B", "co": [5.0, 5.0, 0, null]}))
            .into_entity(None, Utc::now());
        assert_eq!(fresh.heading, None);
    }

    #[test]
    fn test_last_known_values_carry_over() {
        let prior = record(&json!({"id": 1, "cs": "A", "ac": "24", "co": [1, 2, 100.0, 0], "st": {"as": 300}}))
            .into_entity(None, Utc::now());
        let next = record(&json!({"id": 1, "cs": "A", "co": [1, 2, null, 0]}))
            .into_entity(Some(&prior), Utc::now());
        assert_eq!(next.altitude, prior.altitude);
        assert_eq!(next.speed, Some(300.0));
        assert_eq!(next.aircraft_type.as_deref(), Some("24"));
    }
}
