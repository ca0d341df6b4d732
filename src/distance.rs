//! Great-circle distance on a spherical Earth and the running distance total.

use crate::types::TrackPoint;

/// Mean Earth radius (IUGG), meters
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Saturation ceiling for the running total (about 1000 trips around the equator)
pub const MAX_DISTANCE_METERS: f64 = 4.0e10;

/// Haversine distance in meters between two lat/lon pairs given in degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Distance between two accepted points, meters
pub fn distance_meters(a: &TrackPoint, b: &TrackPoint) -> f64 {
    haversine_distance(a.latitude(), a.longitude(), b.latitude(), b.longitude())
}

/// Add `delta` to `total`, never decreasing and never exceeding
/// [`MAX_DISTANCE_METERS`]. Negative or NaN deltas contribute nothing.
pub fn accumulate(total: f64, delta: f64) -> f64 {
    if delta.is_nan() || delta <= 0.0 {
        return total;
    }
    (total + delta).min(MAX_DISTANCE_METERS)
}

/// Running distance over the unthinned stream of accepted points
#[derive(Clone, Debug, Default)]
pub struct DistanceAccumulator {
    total_m: f64,
    last: Option<TrackPoint>,
}

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next accepted point. Returns the distance it added.
    pub fn push(&mut self, point: TrackPoint) -> f64 {
        let delta = match self.last {
            Some(prev) => distance_meters(&prev, &point),
            None => 0.0,
        };
        let before = self.total_m;
        self.total_m = accumulate(self.total_m, delta);
        self.last = Some(point);
        self.total_m - before
    }

    pub fn total_meters(&self) -> f64 {
        self.total_m
    }
}
