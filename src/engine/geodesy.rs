//! Spherical great-circle helpers on a mean Earth radius expressed in nautical miles.
//!
//! NaN inputs propagate to NaN outputs; nothing here fails.

use crate::engine::models::Position;

/// Mean Earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.0;

/// Wraps any bearing into [0, 360).
pub fn normalize_bearing(bearing_deg: f64) -> f64 {
    let wrapped = bearing_deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Computes the position reached from `origin` along `bearing_deg` after `distance_nm`.
pub fn project(origin: &Position, bearing_deg: f64, distance_nm: f64) -> Position {
    let angular_dist = distance_nm / EARTH_RADIUS_NM;
    let bearing_rad = normalize_bearing(bearing_deg).to_radians();

    let start_lat = origin.lat.to_radians();
    let start_lon = origin.lon.to_radians();

    let end_lat = (start_lat.sin() * angular_dist.cos()
        + start_lat.cos() * angular_dist.sin() * bearing_rad.cos())
    .asin();

    let end_lon = start_lon
        + (bearing_rad.sin() * angular_dist.sin() * start_lat.cos())
            .atan2(angular_dist.cos() - start_lat.sin() * end_lat.sin());

    Position::new(end_lat.to_degrees(), end_lon.to_degrees())
}

/// Initial great-circle bearing from `from` to `to`, in [0, 360).
pub fn bearing(from: &Position, to: &Position) -> f64 {
    let start_lat = from.lat.to_radians();
    let end_lat = to.lat.to_radians();
    let d_lon = (to.lon - from.lon).to_radians();

    let y = d_lon.sin() * end_lat.cos();
    let x = start_lat.cos() * end_lat.sin() - start_lat.sin() * end_lat.cos() * d_lon.cos();
    normalize_bearing(y.atan2(x).to_degrees())
}

/// Haversine great-circle distance in nautical miles.
pub fn distance(from: &Position, to: &Position) -> f64 {
    let start_lat = from.lat.to_radians();
    let end_lat = to.lat.to_radians();
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lon - from.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + start_lat.cos() * end_lat.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_NM * c
}
