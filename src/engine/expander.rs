use rayon::prelude::*;
use rayon::ThreadPool;

use crate::config::RouterConfig;
use crate::engine::error::RoutingError;
use crate::engine::geodesy;
use crate::engine::mask::WaterMask;
use crate::engine::models::{Expansion, Position};
use crate::engine::physics::PhysicsModel;
use crate::engine::wind::{wind_with_fallback, WindSource};
use crate::parsers::polars::PolarTable;

/// Below this run, in nautical miles, a heading counts as no movement.
const STALL_DISTANCE_NM: f64 = 1e-9;

/// How candidate children are admitted, chosen once per leg.
#[derive(Clone, Copy)]
pub enum FrontierStrategy<'a> {
    /// Children must be strictly closer to the target than their parent.
    BoundedByProgress,
    /// Children must be on water.
    BoundedByWaterMask(&'a dyn WaterMask),
}

impl<'a> FrontierStrategy<'a> {
    pub fn select(land_contact: bool, water: Option<&'a dyn WaterMask>) -> Result<Self, RoutingError> {
        match (land_contact, water) {
            (false, _) => Ok(FrontierStrategy::BoundedByProgress),
            (true, Some(mask)) => Ok(FrontierStrategy::BoundedByWaterMask(mask)),
            (true, None) => Err(RoutingError::InvalidConfig(
                "land contact avoidance needs a water mask".to_string(),
            )),
        }
    }

    pub fn uses_progress_filter(&self) -> bool {
        matches!(self, FrontierStrategy::BoundedByProgress)
    }

    fn admits(&self, parent: &Position, child: &Position, target: &Position) -> bool {
        match self {
            FrontierStrategy::BoundedByProgress => child.planar_distance(target) < parent.planar_distance(target),
            FrontierStrategy::BoundedByWaterMask(mask) => mask.is_water(child),
        }
    }
}

/// Fans every frontier point out over headings for one time step.
pub struct FrontierExpander<'a> {
    config: &'a RouterConfig,
    polar: &'a PolarTable,
    wind: &'a dyn WindSource,
    strategy: FrontierStrategy<'a>,
    pool: &'a ThreadPool,
}

impl<'a> FrontierExpander<'a> {
    pub fn new(
        config: &'a RouterConfig,
        polar: &'a PolarTable,
        wind: &'a dyn WindSource,
        strategy: FrontierStrategy<'a>,
        pool: &'a ThreadPool,
    ) -> Self {
        Self { config, polar, wind, strategy, pool }
    }

    pub fn strategy(&self) -> FrontierStrategy<'a> {
        self.strategy
    }

    fn headings(&self) -> impl Iterator<Item = f64> + '_ {
        (0..)
            .map(|k| k as f64 * self.config.heading_step_deg)
            .take_while(|&heading| heading < 360.0)
    }

    /// Admissible children of `point` after one time step starting at simulated `hour`.
    pub fn expand_point(&self, point: &Position, hour: f64, target: &Position) -> Result<Expansion, RoutingError> {
        let hour_index = hour.max(0.0).floor() as u32;
        let wind = wind_with_fallback(self.wind, point, hour_index)?;

        let mut children = Vec::new();
        let mut stalled = true;
        for heading in self.headings() {
            let speed = PhysicsModel::boat_speed(self.polar, &wind, heading)?;
            let run = PhysicsModel::distance_run(speed, self.config.time_step_hours);
            if run > STALL_DISTANCE_NM {
                stalled = false;
            }

            let child = geodesy::project(point, heading, run);
            if self.config.bounds.contains(&child) && self.strategy.admits(point, &child, target) {
                children.push(child);
            }
        }

        Ok(Expansion { parent: *point, children, stalled })
    }

    /// Expands every point on the pool. Results keep the input order.
    pub fn expand_frontier(
        &self,
        points: &[Position],
        hour: f64,
        target: &Position,
    ) -> Result<Vec<Expansion>, RoutingError> {
        self.pool.install(|| {
            points
                .par_iter()
                .map(|point| self.expand_point(point, hour, target))
                .collect::<Result<Vec<_>, _>>()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::models::{NavigationBounds, WindData};
    use crate::engine::wind::ConstantWind;
    use crate::parsers::polars::tests::sample_polar;

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn config() -> RouterConfig {
        RouterConfig { time_step_hours: 1.0, heading_step_deg: 30.0, ..RouterConfig::default() }
    }

    #[test]
    fn test_fan_without_filters() {
        let config = config();
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(15.0, 270.0));
        let pool = pool();
        // Water everywhere: only the bounds filter applies
        let ocean = |_: &Position| true;
        let expander =
            FrontierExpander::new(&config, &polar, &wind, FrontierStrategy::BoundedByWaterMask(&ocean), &pool);

        let origin = Position::new(47.0, -3.0);
        let expansion = expander.expand_point(&origin, 0.0, &Position::new(48.0, -3.0)).unwrap();
        assert_eq!(expansion.parent, origin);
        // 12 headings; heading 270 is head to wind and does not move
        assert_eq!(expansion.children.len(), 12);
        assert!(!expansion.stalled);

        // Heading 0 is a beam reach at 8 kn
        let north = expansion.children[0];
        assert!((geodesy::distance(&origin, &north) - 8.0).abs() < 1e-6);
        assert!(expansion.children[9].nearly_equals(&origin));
    }

    #[test]
    fn test_progress_filter_keeps_closer_children() {
        let config = config();
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(15.0, 270.0));
        let pool = pool();
        let expander = FrontierExpander::new(&config, &polar, &wind, FrontierStrategy::BoundedByProgress, &pool);

        let origin = Position::new(47.0, -3.0);
        let target = Position::new(48.0, -3.0);
        let expansion = expander.expand_point(&origin, 0.0, &target).unwrap();
        assert!(!expansion.children.is_empty());
        for child in &expansion.children {
            assert!(child.planar_distance(&target) < origin.planar_distance(&target));
        }
        // Head to wind child sits on the parent and is not progress
        assert!(expansion.children.iter().all(|c| !c.nearly_equals(&origin)));
    }

    #[test]
    fn test_water_mask_and_bounds_filters() {
        let config = RouterConfig { bounds: NavigationBounds::new(46.0, -4.0, 47.05, -2.0), ..config() };
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(15.0, 270.0));
        let pool = pool();
        let east_is_land = |p: &Position| p.lon < -3.0 + 1e-6;
        let expander =
            FrontierExpander::new(&config, &polar, &wind, FrontierStrategy::BoundedByWaterMask(&east_is_land), &pool);

        let origin = Position::new(47.0, -3.0);
        let expansion = expander.expand_point(&origin, 0.0, &Position::new(46.0, -3.0)).unwrap();
        assert!(!expansion.children.is_empty());
        for child in &expansion.children {
            assert!(child.lon < -3.0 + 1e-6);
            assert!(child.lat <= 47.05);
        }
    }

    #[test]
    fn test_calm_stalls_point() {
        let config = config();
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(0.0, 0.0));
        let pool = pool();
        let ocean = |_: &Position| true;
        let expander =
            FrontierExpander::new(&config, &polar, &wind, FrontierStrategy::BoundedByWaterMask(&ocean), &pool);

        let expansion = expander.expand_point(&Position::new(47.0, -3.0), 0.0, &Position::new(48.0, -3.0)).unwrap();
        assert!(expansion.stalled);
    }

    #[test]
    fn test_errors_propagate_from_workers() {
        let config = config();
        let polar = sample_polar();
        let gale = ConstantWind(WindData::new(45.0, 270.0));
        let pool = pool();
        let expander = FrontierExpander::new(&config, &polar, &gale, FrontierStrategy::BoundedByProgress, &pool);

        let points = vec![Position::new(47.0, -3.0), Position::new(47.1, -3.0)];
        let result = expander.expand_frontier(&points, 0.0, &Position::new(48.0, -3.0));
        assert!(matches!(result, Err(RoutingError::Polar(_))));

        let no_wind = |_: &Position, _: u32| -> Option<WindData> { None };
        let expander = FrontierExpander::new(&config, &polar, &no_wind, FrontierStrategy::BoundedByProgress, &pool);
        let result = expander.expand_frontier(&points, 3.7, &Position::new(48.0, -3.0));
        assert!(matches!(result, Err(RoutingError::WindUnavailable { hour: 3, .. })));
    }

    #[test]
    fn test_frontier_results_keep_input_order() {
        let config = config();
        let polar = sample_polar();
        let wind = ConstantWind(WindData::new(15.0, 270.0));
        let pool = pool();
        let expander = FrontierExpander::new(&config, &polar, &wind, FrontierStrategy::BoundedByProgress, &pool);

        let points: Vec<Position> = (0..32).map(|i| Position::new(47.0, -3.0 + i as f64 * 0.01)).collect();
        let expansions = expander.expand_frontier(&points, 0.0, &Position::new(48.0, -3.0)).unwrap();
        let parents: Vec<Position> = expansions.iter().map(|e| e.parent).collect();
        assert_eq!(parents, points);
    }

    #[test]
    fn test_strategy_selection() {
        assert!(FrontierStrategy::select(false, None).unwrap().uses_progress_filter());
        let ocean = |_: &Position| true;
        assert!(!FrontierStrategy::select(true, Some(&ocean)).unwrap().uses_progress_filter());
        assert!(matches!(FrontierStrategy::select(true, None), Err(RoutingError::InvalidConfig(_))));
    }
}
