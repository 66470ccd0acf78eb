// THEORY:
// `geo_math` is the stateless foundation that every spatial component stands on.
// It owns the two value types that describe the world (`Coordinate` and
// `BoundingBox`) and the handful of conversions needed to move between meters
// on the ground and degrees on the globe.
//
// Key architectural principles:
// 1.  **Equirectangular Approximation**: Scanned regions span at most a few
//     kilometers, so the globe is treated as locally flat. A meter north is
//     always the same number of degrees of latitude; a meter east is scaled by
//     `cos(latitude)`.
// 2.  **Pure Functions**: Nothing here holds state or fails. The only undefined
//     input is a longitude conversion at the poles, which callers avoid.
// 3.  **Exact Distance for Merging**: While the grid uses the flat approximation,
//     the distance used to decide whether two detections are the same object is
//     the haversine great-circle distance.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Returns a new coordinate shifted by the given distances in meters.
    /// Positive `north_m` moves north, positive `east_m` moves east. The
    /// longitude scale is taken at this coordinate's latitude.
    pub fn offset_by_meters(&self, north_m: f64, east_m: f64) -> Self {
        Self {
            latitude: self.latitude + geo_math::meters_to_lat_degrees(north_m),
            longitude: self.longitude + geo_math::meters_to_lon_degrees(east_m, self.latitude),
        }
    }

    /// The arithmetic mean of two coordinates.
    pub fn midpoint(&self, other: &Coordinate) -> Self {
        Self {
            latitude: (self.latitude + other.latitude) / 2.0,
            longitude: (self.longitude + other.longitude) / 2.0,
        }
    }
}

/// The north-west / south-east corner pair that defines a scanned region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top_left: Coordinate,
    pub bottom_right: Coordinate,
}

impl BoundingBox {
    pub fn new(top_left: Coordinate, bottom_right: Coordinate) -> Self {
        Self { top_left, bottom_right }
    }

    /// Latitude halfway between the north and south edges.
    pub fn mid_latitude(&self) -> f64 {
        (self.top_left.latitude + self.bottom_right.latitude) / 2.0
    }

    /// North-south extent in meters.
    pub fn lat_span_meters(&self) -> f64 {
        geo_math::lat_degrees_to_meters(self.top_left.latitude - self.bottom_right.latitude)
    }

    /// East-west extent in meters, measured at the box's mid latitude.
    pub fn lon_span_meters(&self) -> f64 {
        geo_math::lon_degrees_to_meters(
            self.bottom_right.longitude - self.top_left.longitude,
            self.mid_latitude(),
        )
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        point.latitude <= self.top_left.latitude
            && point.latitude >= self.bottom_right.latitude
            && point.longitude >= self.top_left.longitude
            && point.longitude <= self.bottom_right.longitude
    }
}

pub mod geo_math {
    use super::*;

    /// Converts a north-south distance in meters to degrees of latitude.
    pub fn meters_to_lat_degrees(meters: f64) -> f64 {
        (meters / EARTH_RADIUS_METERS).to_degrees()
    }

    /// Converts an east-west distance in meters to degrees of longitude at the
    /// given latitude. Undefined at the poles.
    pub fn meters_to_lon_degrees(meters: f64, at_latitude: f64) -> f64 {
        (meters / (EARTH_RADIUS_METERS * at_latitude.to_radians().cos())).to_degrees()
    }

    pub fn lat_degrees_to_meters(degrees: f64) -> f64 {
        degrees.to_radians() * EARTH_RADIUS_METERS
    }

    pub fn lon_degrees_to_meters(degrees: f64, at_latitude: f64) -> f64 {
        degrees.to_radians() * EARTH_RADIUS_METERS * at_latitude.to_radians().cos()
    }

    /// Haversine distance between two coordinates, in meters.
    pub fn great_circle_distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
        let lat_a = a.latitude.to_radians();
        let lat_b = b.latitude.to_radians();
        let d_lat = lat_b - lat_a;
        let d_lon = (b.longitude - a.longitude).to_radians();

        let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
    }
}
