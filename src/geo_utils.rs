//! Geographic distance utilities.
//!
//! Great-circle distance via the Haversine formula, plus route-level
//! accumulation over consecutive fixes. All functions are pure; NaN
//! coordinates propagate NaN (validation is the caller's job, see
//! [`GeoPoint::is_valid`](crate::GeoPoint::is_valid)).

use crate::GeoPoint;

/// Earth radius in meters (mean radius).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate the Haversine distance between two points in meters.
pub fn haversine_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Calculate the total distance of a route in meters.
///
/// Sums the Haversine distance over consecutive pairs; returns 0.0 for
/// fewer than 2 points.
pub fn route_distance_m(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance_m(&w[0], &w[1]))
        .sum()
}
