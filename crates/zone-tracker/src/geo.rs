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

//! Geographic primitives: points, polygon containment and bearings.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True if both coordinates are finite and within the valid WGS84 ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat.abs() <= 90.0
            && self.lon.abs() <= 180.0
    }
}

/// Ray-casting point-in-polygon test.
///
/// The ring is treated as implicitly closed (the last vertex connects back to
/// the first). An edge is counted when the point's longitude lies in the
/// half-open span of the edge and the point lies south of the edge at that
/// longitude, so shared vertices are never counted twice.
///
/// Points exactly on the boundary get a deterministic but side-dependent
/// answer: for an axis-aligned rectangle the southern and western edges count
/// as inside and the northern and eastern edges as outside.
#[must_use]
pub fn contains(point: GeoPoint, ring: &[GeoPoint]) -> bool {
    let n = ring.len();
    if n == 0 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = ring[i];
        let vj = ring[j];
        if (vi.lon > point.lon) != (vj.lon > point.lon) {
            let lat_at_lon = (vj.lat - vi.lat) * (point.lon - vi.lon) / (vj.lon - vi.lon) + vi.lat;
            if point.lat < lat_at_lon {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Normalize an angle in degrees to the range [0, 360).
#[must_use]
pub fn normalize_heading(degrees: f64) -> f64 {
    let h = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if h >= 360.0 {
        0.0
    } else {
        h
    }
}

/// Initial great-circle bearing from `from` to `to`, in degrees [0, 360).
#[must_use]
pub fn initial_bearing(from: GeoPoint, to: GeoPoint) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let delta_lambda = (to.lon - from.lon).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    normalize_heading(y.atan2(x).to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 10.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(10.0, 0.0),
        ]
    }

    #[test]
    fn test_contains_interior_points() {
        let ring = square();
        for lat in [0.5, 2.0, 5.0, 9.5] {
            for lon in [0.5, 3.0, 7.0, 9.5] {
                assert!(contains(GeoPoint::new(lat, lon), &ring), "({lat}, {lon})");
            }
        }
    }

    #[test]
    fn test_contains_exterior_points() {
        let ring = square();
        for (lat, lon) in [(-1.0, 5.0), (11.0, 5.0), (5.0, -1.0), (5.0, 11.0), (20.0, 20.0), (-5.0, -5.0)] {
            assert!(!contains(GeoPoint::new(lat, lon), &ring), "({lat}, {lon})");
        }
    }

    #[test]
    fn test_boundary_is_deterministic() {
        let ring = square();
        // Documented behaviour of the half-open edge rule, not a contract.
        assert!(contains(GeoPoint::new(0.0, 5.0), &ring));
        assert!(!contains(GeoPoint::new(10.0, 5.0), &ring));
        assert!(contains(GeoPoint::new(5.0, 0.0), &ring));
        assert!(!contains(GeoPoint::new(5.0, 10.0), &ring));
    }

    #[test]
    fn test_ring_does_not_need_closing_vertex() {
        let open = square();
        let mut closed = square();
        closed.push(closed[0]);
        for p in [GeoPoint::new(5.0, 5.0), GeoPoint::new(12.0, 5.0)] {
            assert_eq!(contains(p, &open), contains(p, &closed));
        }
    }

    #[test]
    fn test_concave_polygon() {
        // U shape opening north: notch between lon 3 and 7 above lat 3
        let ring = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(10.0, 0.0),
            GeoPoint::new(10.0, 3.0),
            GeoPoint::new(3.0, 3.0),
            GeoPoint::new(3.0, 7.0),
            GeoPoint::new(10.0, 7.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(0.0, 10.0),
        ];
        assert!(contains(GeoPoint::new(1.0, 5.0), &ring));
        assert!(!contains(GeoPoint::new(6.0, 5.0), &ring));
        assert!(contains(GeoPoint::new(6.0, 1.5), &ring));
    }

    #[test]
    fn test_empty_ring() {
        assert!(!contains(GeoPoint::new(0.0, 0.0), &[]));
    }

    #[test]
    fn test_normalize_heading() {
        assert!((normalize_heading(370.0) - 10.0).abs() < 1e-9);
        assert!((normalize_heading(-90.0) - 270.0).abs() < 1e-9);
        assert!(normalize_heading(360.0).abs() < 1e-9);
    }

    #[test]
    fn test_initial_bearing_cardinal() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert!(initial_bearing(origin, GeoPoint::new(1.0, 0.0)).abs() < 1e-6);
        assert!((initial_bearing(origin, GeoPoint::new(0.0, 1.0)) - 90.0).abs() < 1e-6);
        assert!((initial_bearing(origin, GeoPoint::new(-1.0, 0.0)) - 180.0).abs() < 1e-6);
        assert!((initial_bearing(origin, GeoPoint::new(0.0, -1.0)) - 270.0).abs() < 1e-6);
    }

    #[test]
    fn test_point_validity() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::INFINITY).is_valid());
    }
}
