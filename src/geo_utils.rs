//! Geographic utilities for distance and unit conversion.

use std::f64::consts::PI;

use geo::{HaversineDistance, Point};

use crate::Coordinate;

/// Mean earth radius in meters, matching the radius used by `geo`'s haversine.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude on the haversine sphere.
pub const METERS_PER_DEG_LAT: f64 = MEAN_EARTH_RADIUS_M * PI / 180.0;

/// Great-circle distance between two coordinates in meters.
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let pa = Point::new(a.longitude, a.latitude);
    let pb = Point::new(b.longitude, b.latitude);
    pa.haversine_distance(&pb)
}

/// Planar distance in raw degrees.
pub fn degree_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let dx = a.longitude - b.longitude;
    let dy = a.latitude - b.latitude;
    (dx * dx + dy * dy).sqrt()
}

/// Convert meters to degrees of latitude.
pub fn meters_to_degrees_lat(meters: f64) -> f64 {
    meters / METERS_PER_DEG_LAT
}

/// Convert meters to degrees of longitude at a given latitude.
///
/// Near the poles the result saturates at a full turn.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let cos_lat = latitude.to_radians().cos().abs();
    if cos_lat < 1e-10 {
        return 360.0;
    }
    (meters / (METERS_PER_DEG_LAT * cos_lat)).min(360.0)
}

/// Coordinate reached by moving `east` and `north` meters from `origin`.
pub fn offset_meters(origin: &Coordinate, east: f64, north: f64) -> Coordinate {
    Coordinate::new(
        origin.longitude + meters_to_degrees(east, origin.latitude),
        origin.latitude + meters_to_degrees_lat(north),
    )
}
