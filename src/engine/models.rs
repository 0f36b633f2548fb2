use geo::{Coord, Intersects, Rect};
use serde::{Deserialize, Serialize};

/// Quantum used to key positions, in degrees.
pub const POSITION_QUANTUM: f64 = 1e-9;

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Fixed-precision key, stable under float noise below [`POSITION_QUANTUM`].
    pub fn key(&self) -> PositionKey {
        PositionKey {
            lat: (self.lat / POSITION_QUANTUM).round() as i64,
            lon: (self.lon / POSITION_QUANTUM).round() as i64,
        }
    }

    pub fn nearly_equals(&self, other: &Position) -> bool {
        self.key() == other.key()
    }

    /// Euclidean distance in degree space.
    pub fn planar_distance(&self, other: &Position) -> f64 {
        let d_lat = self.lat - other.lat;
        let d_lon = self.lon - other.lon;
        (d_lat * d_lat + d_lon * d_lon).sqrt()
    }

    pub(crate) fn to_coord(self) -> Coord<f64> {
        Coord { x: self.lon, y: self.lat }
    }

    pub(crate) fn from_coord(coord: Coord<f64>) -> Self {
        Self::new(coord.y, coord.x)
    }
}

/// Quantized position, ordered by latitude then longitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey {
    pub lat: i64,
    pub lon: i64,
}

/// Axis-aligned box every admissible position must fall into (edges included).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavigationBounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl NavigationBounds {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self { min_lat, min_lon, max_lat, max_lon }
    }

    pub fn is_valid(&self) -> bool {
        self.min_lat < self.max_lat && self.min_lon < self.max_lon
    }

    fn rect(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.min_lon, y: self.min_lat },
            Coord { x: self.max_lon, y: self.max_lat },
        )
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.rect().intersects(&position.to_coord())
    }
}

impl Default for NavigationBounds {
    fn default() -> Self {
        Self::new(-90.0, -180.0, 90.0, 180.0)
    }
}

/// Wind at a point: speed in knots and the direction it blows from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindData {
    pub speed_kts: f64,
    /// Navigational convention: 0 = from North, 90 = from East.
    pub direction_deg: f64,
}

impl WindData {
    pub fn new(speed_kts: f64, direction_deg: f64) -> Self {
        Self { speed_kts, direction_deg }
    }
}

/// One parent frontier point and the children it produced in a time step.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub parent: Position,
    pub children: Vec<Position>,
    /// Every heading produced zero distance (no boat speed in this wind).
    pub stalled: bool,
}

/// Path of one leg, from its root to the point closest to its target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegRoute {
    pub index: usize,
    pub start_hour: f64,
    pub end_hour: f64,
    pub iterations: usize,
    pub path: Vec<Position>,
}

/// Full multi-leg route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub time_step_hours: f64,
    pub legs: Vec<LegRoute>,
}

impl Route {
    /// Concatenation of every leg path. Junction points appear twice.
    pub fn positions(&self) -> Vec<Position> {
        self.legs.iter().flat_map(|leg| leg.path.iter().copied()).collect()
    }

    pub fn len(&self) -> usize {
        self.legs.iter().map(|leg| leg.path.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<Position> {
        self.legs.last().and_then(|leg| leg.path.last().copied())
    }

    pub fn total_iterations(&self) -> usize {
        self.legs.iter().map(|leg| leg.iterations).sum()
    }
}

/// Advisory per-iteration progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub leg: usize,
    pub iteration: usize,
    pub simulated_hour: f64,
    pub frontier_size: usize,
    pub cloud_size: usize,
}
