use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::engine::error::RoutingError;
use crate::engine::geodesy;
use crate::engine::models::{Position, Route, WindData};
use crate::engine::physics::PhysicsModel;
use crate::engine::wind::{wind_with_fallback, WindSource};
use crate::parsers::polars::PolarTable;

/// One time step of the route, between two consecutive points of a leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSegment {
    pub leg: usize,
    /// Simulated hour at `from`.
    pub hour: f64,
    pub time: Option<DateTime<Utc>>,
    pub from: Position,
    pub to: Position,
    pub heading_deg: f64,
    pub distance_nm: f64,
    pub wind: WindData,
    pub boat_speed_kts: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteReport {
    pub departure: Option<DateTime<Utc>>,
    pub segments: Vec<RouteSegment>,
    pub total_distance_nm: f64,
    pub elapsed_hours: f64,
}

fn wall_clock(departure: Option<DateTime<Utc>>, hour: f64) -> Option<DateTime<Utc>> {
    departure.map(|start| start + Duration::milliseconds((hour * 3_600_000.0).round() as i64))
}

impl RouteReport {
    pub fn build(
        route: &Route,
        polar: &PolarTable,
        wind: &dyn WindSource,
        departure: Option<DateTime<Utc>>,
    ) -> Result<Self, RoutingError> {
        let mut segments = Vec::with_capacity(route.len());

        for leg in &route.legs {
            for (k, pair) in leg.path.windows(2).enumerate() {
                let (from, to) = (pair[0], pair[1]);
                let hour = leg.start_hour + k as f64 * route.time_step_hours;
                let heading_deg = geodesy::bearing(&from, &to);
                let wind_at_from = wind_with_fallback(wind, &from, hour.max(0.0).floor() as u32)?;
                let boat_speed_kts = PhysicsModel::boat_speed(polar, &wind_at_from, heading_deg)?;

                segments.push(RouteSegment {
                    leg: leg.index,
                    hour,
                    time: wall_clock(departure, hour),
                    from,
                    to,
                    heading_deg,
                    distance_nm: geodesy::distance(&from, &to),
                    wind: wind_at_from,
                    boat_speed_kts,
                });
            }
        }

        let total_distance_nm = segments.iter().map(|segment| segment.distance_nm).sum();
        let elapsed_hours = match (route.legs.first(), route.legs.last()) {
            (Some(first), Some(last)) => last.end_hour - first.start_hour,
            _ => 0.0,
        };

        Ok(Self { departure, segments, total_distance_nm, elapsed_hours })
    }

    pub fn arrival(&self) -> Option<DateTime<Utc>> {
        self.departure.and_then(|_| {
            let first_hour = self.segments.first().map_or(0.0, |segment| segment.hour);
            wall_clock(self.departure, first_hour + self.elapsed_hours)
        })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "leg  hour    time              lat       lon        hdg   dist  tws   twd   bsp");
        for s in &self.segments {
            let time = s.time.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
            let _ = writeln!(
                out,
                "{:<4} {:>6.2}  {:<16}  {:>8.4}  {:>9.4}  {:>5.1}  {:>5.2} {:>5.1} {:>5.0} {:>5.2}",
                s.leg,
                s.hour,
                time,
                s.from.lat,
                s.from.lon,
                s.heading_deg,
                s.distance_nm,
                s.wind.speed_kts,
                s.wind.direction_deg,
                s.boat_speed_kts
            );
        }
        let _ = writeln!(
            out,
            "total: {:.1} nm in {:.2} h ({} segments)",
            self.total_distance_nm,
            self.elapsed_hours,
            self.segments.len()
        );
        if let Some(arrival) = self.arrival() {
            let _ = writeln!(out, "arrival: {}", arrival.to_rfc3339());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::models::LegRoute;
    use crate::engine::wind::ConstantWind;
    use crate::parsers::polars::tests::sample_polar;

    fn two_leg_route() -> Route {
        let a = Position::new(47.0, -3.0);
        let b = geodesy::project(&a, 0.0, 2.0);
        let c = geodesy::project(&b, 0.0, 2.0);
        let d = geodesy::project(&c, 90.0, 1.5);
        Route {
            time_step_hours: 0.25,
            legs: vec![
                LegRoute { index: 0, start_hour: 0.0, end_hour: 0.5, iterations: 2, path: vec![a, b, c] },
                LegRoute { index: 1, start_hour: 0.5, end_hour: 0.75, iterations: 1, path: vec![c, d] },
            ],
        }
    }

    #[test]
    fn test_segments_skip_leg_junction() {
        let route = two_leg_route();
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(15.0, 270.0));
        let report = RouteReport::build(&route, &polar, &wind, None).unwrap();

        assert_eq!(report.segments.len(), 3);
        assert_eq!(report.segments.iter().map(|s| s.leg).collect::<Vec<_>>(), vec![0, 0, 1]);
        assert_eq!(report.segments.iter().map(|s| s.hour).collect::<Vec<_>>(), vec![0.0, 0.25, 0.5]);
        assert!((report.total_distance_nm - 5.5).abs() < 1e-6);
        assert_eq!(report.elapsed_hours, 0.75);
        assert!(report.segments.iter().all(|s| s.time.is_none()));
    }

    #[test]
    fn test_segment_heading_and_speed() {
        let route = two_leg_route();
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(15.0, 270.0));
        let report = RouteReport::build(&route, &polar, &wind, None).unwrap();

        let first = &report.segments[0];
        assert!(first.heading_deg < 1e-6 || first.heading_deg > 360.0 - 1e-6);
        assert!((first.boat_speed_kts - 8.0).abs() < 1e-3);
        // Heading east with wind from the west is dead downwind
        let last = &report.segments[2];
        assert!((last.heading_deg - 90.0).abs() < 0.1);
        assert!((last.boat_speed_kts - 6.0).abs() < 0.05);
    }

    #[test]
    fn test_wall_clock_times() {
        let route = two_leg_route();
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(15.0, 270.0));
        let departure: DateTime<Utc> = "2026-06-01T08:00:00Z".parse().unwrap();
        let report = RouteReport::build(&route, &polar, &wind, Some(departure)).unwrap();

        assert_eq!(report.segments[1].time.unwrap().to_rfc3339(), "2026-06-01T08:15:00+00:00");
        assert_eq!(report.arrival().unwrap().to_rfc3339(), "2026-06-01T08:45:00+00:00");

        let text = report.to_text();
        assert!(text.contains("2026-06-01 08:30"));
        assert!(text.contains("total: 5.5 nm in 0.75 h (3 segments)"));
        assert!(text.contains("arrival: 2026-06-01T08:45:00+00:00"));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let route = two_leg_route();
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(15.0, 270.0));
        let report = RouteReport::build(&route, &polar, &wind, None).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["segments"].as_array().unwrap().len(), 3);
        assert_eq!(json["segments"][2]["leg"], 1);
        assert!(json["departure"].is_null());
    }

    #[test]
    fn test_missing_wind_fails() {
        let route = two_leg_route();
        let polar = sample_polar();
        let nothing = |_: &Position, _: u32| -> Option<WindData> { None };
        assert!(matches!(
            RouteReport::build(&route, &polar, &nothing, None),
            Err(RoutingError::WindUnavailable { .. })
        ));
    }
}
