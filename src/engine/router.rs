use std::iter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::RouterConfig;
use crate::engine::chain::ParentChain;
use crate::engine::error::{RoutingError, SearchPhase};
use crate::engine::expander::{FrontierExpander, FrontierStrategy};
use crate::engine::hull;
use crate::engine::mask::WaterMask;
use crate::engine::models::{LegRoute, Position, ProgressEvent, Route};
use crate::engine::wind::WindSource;
use crate::parsers::polars::PolarTable;

/// Cooperative stop flag, checked once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Search state of the leg in progress.
struct LegState {
    chain: ParentChain,
    frontier: Vec<Position>,
    hour: f64,
}

pub struct IsochroneRouter<'a> {
    config: &'a RouterConfig,
    polar: &'a PolarTable,
    wind: &'a dyn WindSource,
    water: Option<&'a dyn WaterMask>,
    pool: ThreadPool,
    progress: Option<Sender<ProgressEvent>>,
    cancel: CancellationToken,
}

impl<'a> IsochroneRouter<'a> {
    pub fn new(config: &'a RouterConfig, polar: &'a PolarTable, wind: &'a dyn WindSource) -> Result<Self, RoutingError> {
        config.validate()?;

        let mut builder = ThreadPoolBuilder::new();
        if let Some(threads) = config.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|err| RoutingError::InvalidConfig(format!("cannot start worker pool: {}", err)))?;

        Ok(Self { config, polar, wind, water: None, pool, progress: None, cancel: CancellationToken::new() })
    }

    pub fn with_water_mask(mut self, water: &'a dyn WaterMask) -> Self {
        self.water = Some(water);
        self
    }

    pub fn with_progress(mut self, progress: Sender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Routes through every waypoint in order. Each leg starts where the previous one ended.
    pub fn route(&self, waypoints: &[Position]) -> Result<Route, RoutingError> {
        if waypoints.len() < 2 {
            return Err(RoutingError::InvalidConfig(format!(
                "need at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }

        let mut legs: Vec<LegRoute> = Vec::with_capacity(waypoints.len() - 1);
        let mut start = waypoints[0];
        let mut hour = self.config.start_hour;

        for (index, target) in waypoints[1..].iter().enumerate() {
            let leg = self.route_leg(index, start, *target, hour)?;
            if let Some(last) = leg.path.last() {
                start = *last;
            }
            hour = leg.end_hour;
            legs.push(leg);
        }

        let route = Route { time_step_hours: self.config.time_step_hours, legs };
        info!(
            "Route complete: {} legs, {} points, {} iterations, {:.2} h",
            route.legs.len(),
            route.len(),
            route.total_iterations(),
            hour - self.config.start_hour
        );
        Ok(route)
    }

    /// Searches one leg from `start` toward `target`, its clock starting at `start_hour`.
    pub fn route_leg(
        &self,
        index: usize,
        start: Position,
        target: Position,
        start_hour: f64,
    ) -> Result<LegRoute, RoutingError> {
        let strategy = FrontierStrategy::select(self.config.land_contact, self.water)
            .map_err(|err| err.in_leg(index, 0, SearchPhase::Expanding))?;
        let expander = FrontierExpander::new(self.config, self.polar, self.wind, strategy, &self.pool);

        info!(
            "Leg {}: ({:.4}, {:.4}) -> ({:.4}, {:.4}) from hour {:.2}",
            index, start.lat, start.lon, target.lat, target.lon, start_hour
        );

        if start.planar_distance(&target) <= self.config.arrival_tolerance_deg {
            info!("Leg {}: start is already within tolerance of the target", index);
            return Ok(LegRoute { index, start_hour, end_hour: start_hour, iterations: 0, path: vec![start] });
        }

        let mut state = LegState { chain: ParentChain::with_root(start), frontier: vec![start], hour: start_hour };

        for iteration in 0..self.config.max_iterations {
            if self.cancel.is_cancelled() {
                info!("Leg {}: cancelled at iteration {}", index, iteration);
                return Err(RoutingError::Cancelled.in_leg(index, iteration, SearchPhase::Expanding));
            }

            if let Some(closest) = self.step(&expander, &mut state, index, iteration, &target)? {
                let path = state
                    .chain
                    .backtrace(&closest)
                    .map_err(|err| err.in_leg(index, iteration, SearchPhase::TerminationCheck))?;
                info!(
                    "Leg {}: arrived after {} iterations at hour {:.2}, {} route points, closest ({:.4}, {:.4})",
                    index,
                    iteration + 1,
                    state.hour,
                    path.len(),
                    closest.lat,
                    closest.lon
                );
                return Ok(LegRoute { index, start_hour, end_hour: state.hour, iterations: iteration + 1, path });
            }
        }

        warn!("Leg {}: no route found within {} iterations", index, self.config.max_iterations);
        Err(RoutingError::SearchExhausted { iterations: self.config.max_iterations }.in_leg(
            index,
            self.config.max_iterations,
            SearchPhase::TerminationCheck,
        ))
    }

    /// One isochrone iteration. Returns the cloud point closest to `target` once the leg has arrived.
    fn step(
        &self,
        expander: &FrontierExpander<'_>,
        state: &mut LegState,
        leg: usize,
        iteration: usize,
        target: &Position,
    ) -> Result<Option<Position>, RoutingError> {
        let at = |phase: SearchPhase| move |err: RoutingError| err.in_leg(leg, iteration, phase);

        // Expanding
        let expansions = expander
            .expand_frontier(&state.frontier, state.hour, target)
            .map_err(at(SearchPhase::Expanding))?;
        state.hour += self.config.time_step_hours;

        let stalled = expansions.iter().filter(|expansion| expansion.stalled).count();
        if stalled > 0 {
            warn!(
                "Leg {} iteration {}: {} of {} frontier points stalled (no boat speed)",
                leg,
                iteration,
                stalled,
                expansions.len()
            );
        }

        // BoundaryExtraction
        let cloud: Vec<Position> = expansions
            .iter()
            .flat_map(|expansion| iter::once(expansion.parent).chain(expansion.children.iter().copied()))
            .collect();
        let boundary = hull::concave_hull(&cloud, &self.config.hull).map_err(at(SearchPhase::BoundaryExtraction))?;

        // ForwardArc
        let boundary = if expander.strategy().uses_progress_filter() {
            hull::forward_arc(&boundary, target)
        } else {
            boundary
        };

        // Pruning
        let frontier = hull::prune(&boundary, self.config.elimination_radius_deg);

        // ParentUpdate
        for expansion in &expansions {
            for child in &expansion.children {
                state.chain.record(*child, &expansion.parent);
            }
        }

        debug!(
            "Leg {} iteration {}: hour {:.2}, cloud {}, boundary {}, frontier {}, chain {}",
            leg,
            iteration,
            state.hour,
            cloud.len(),
            boundary.len(),
            frontier.len(),
            state.chain.len()
        );
        self.notify(ProgressEvent {
            leg,
            iteration,
            simulated_hour: state.hour,
            frontier_size: frontier.len(),
            cloud_size: cloud.len(),
        });
        state.frontier = frontier;

        // TerminationCheck
        let tolerance = self.config.arrival_tolerance_deg;
        if !state.frontier.iter().any(|point| point.planar_distance(target) <= tolerance) {
            return Ok(None);
        }

        let mut closest: Option<(f64, Position)> = None;
        for point in &cloud {
            let d = point.planar_distance(target);
            if closest.is_none_or(|(best, _)| d < best) {
                closest = Some((d, *point));
            }
        }
        closest
            .map(|(_, point)| Some(point))
            .ok_or_else(|| at(SearchPhase::TerminationCheck)(RoutingError::DegenerateGeometry("empty cloud".to_string())))
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            // A dropped receiver only means nobody is listening anymore.
            let _ = progress.send(event);
        }
    }
}
