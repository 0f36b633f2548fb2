use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::error::RoutingError;
use crate::engine::models::{Position, WindData};

/// Point query into a time-varying wind field.
///
/// `hour` is the integer simulated hour. `None` means no data for that hour;
/// implementations must be safe to call from several threads at once.
pub trait WindSource: Sync {
    fn wind_at(&self, position: &Position, hour: u32) -> Option<WindData>;
}

impl<F> WindSource for F
where
    F: Fn(&Position, u32) -> Option<WindData> + Sync,
{
    fn wind_at(&self, position: &Position, hour: u32) -> Option<WindData> {
        self(position, hour)
    }
}

/// Wind looked up at `hour`, retrying earlier hours when the source has none.
pub fn wind_with_fallback(source: &dyn WindSource, position: &Position, hour: u32) -> Result<WindData, RoutingError> {
    for h in (0..=hour).rev() {
        if let Some(wind) = source.wind_at(position, h) {
            if h != hour {
                debug!("No wind at {:?} for hour {}, using hour {}", position, hour, h);
            }
            return Ok(wind);
        }
    }
    Err(RoutingError::WindUnavailable { lat: position.lat, lon: position.lon, hour })
}

/// The same wind everywhere, at all times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantWind(pub WindData);

impl WindSource for ConstantWind {
    fn wind_at(&self, _position: &Position, _hour: u32) -> Option<WindData> {
        Some(self.0)
    }
}

/// One wind observation on the forecast grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub hour: u32,
    pub lat: f64,
    pub lon: f64,
    pub speed_kts: f64,
    pub direction_deg: f64,
}

/// In-memory wind field: per forecast hour, 1x1 degree chunks of samples.
#[derive(Debug, Clone, Default)]
pub struct WindField {
    /// Key: hour, then (lon.floor(), lat.floor())
    hours: BTreeMap<u32, HashMap<(i32, i32), Vec<(Position, WindData)>>>,
}

impl WindField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: &[WindSample]) -> Self {
        let mut field = Self::new();
        for sample in samples {
            field.insert_point(
                sample.hour,
                Position::new(sample.lat, sample.lon),
                WindData::new(sample.speed_kts, sample.direction_deg),
            );
        }
        field
    }

    pub fn insert_point(&mut self, hour: u32, position: Position, wind: WindData) {
        let chunk_x = position.lon.floor() as i32;
        let chunk_y = position.lat.floor() as i32;
        self.hours
            .entry(hour)
            .or_default()
            .entry((chunk_x, chunk_y))
            .or_default()
            .push((position, wind));
    }

    pub fn hours(&self) -> impl Iterator<Item = u32> + '_ {
        self.hours.keys().copied()
    }
}

fn nearest_in_chunk(chunk: &[(Position, WindData)], position: &Position) -> Option<(f64, WindData)> {
    let mut best: Option<(f64, WindData)> = None;
    for (sample, wind) in chunk {
        let dist = sample.planar_distance(position);
        if best.is_none_or(|(best_dist, _)| dist < best_dist) {
            best = Some((dist, *wind));
        }
    }
    best
}

impl WindSource for WindField {
    /// Nearest sample for that hour.
    ///
    /// Chunks are searched in square rings around the position's own chunk. A chunk
    /// `ring` steps away is at least `ring - 1` degrees off, which bounds the search.
    fn wind_at(&self, position: &Position, hour: u32) -> Option<WindData> {
        let chunks = self.hours.get(&hour)?;
        let chunk_x = position.lon.floor() as i32;
        let chunk_y = position.lat.floor() as i32;
        let max_ring = chunks
            .keys()
            .map(|&(x, y)| (x - chunk_x).abs().max((y - chunk_y).abs()))
            .max()?;

        let mut best: Option<(f64, WindData)> = None;
        for ring in 0..=max_ring {
            if best.is_some_and(|(best_dist, _)| (ring - 1) as f64 >= best_dist) {
                break;
            }
            for dx in -ring..=ring {
                for dy in -ring..=ring {
                    if dx.abs().max(dy.abs()) != ring {
                        continue;
                    }
                    let Some(chunk) = chunks.get(&(chunk_x + dx, chunk_y + dy)) else {
                        continue;
                    };
                    if let Some((dist, wind)) = nearest_in_chunk(chunk, position) {
                        if best.is_none_or(|(best_dist, _)| dist < best_dist) {
                            best = Some((dist, wind));
                        }
                    }
                }
            }
        }
        best.map(|(_, wind)| wind)
    }
}
