use crate::engine::error::PolarError;
use crate::engine::models::WindData;
use crate::parsers::polars::PolarTable;

pub struct PhysicsModel;

impl PhysicsModel {
    /// Calculates True Wind Angle (TWA) from True Wind Direction (TWD) and boat heading,
    /// folded into [0, 180] since polars are symmetric.
    pub fn calculate_twa(twd: f64, heading: f64) -> f64 {
        PolarTable::fold_angle(twd - heading)
    }

    /// Boat speed through water (knots) on `heading` in the given wind.
    pub fn boat_speed(polar: &PolarTable, wind: &WindData, heading: f64) -> Result<f64, PolarError> {
        let twa = Self::calculate_twa(wind.direction_deg, heading);
        polar.boat_speed(wind.speed_kts, twa)
    }

    /// Distance run in nautical miles at `speed_kts` over `hours`.
    pub fn distance_run(speed_kts: f64, hours: f64) -> f64 {
        speed_kts * hours
    }
}
