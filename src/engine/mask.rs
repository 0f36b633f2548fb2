use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use roaring::RoaringTreemap;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::engine::models::Position;

/// Land/sea classification, queried only when land contact avoidance is on.
pub trait WaterMask: Sync {
    fn is_water(&self, position: &Position) -> bool;
}

impl<F> WaterMask for F
where
    F: Fn(&Position) -> bool + Sync,
{
    fn is_water(&self, position: &Position) -> bool {
        self(position)
    }
}

/// Global grid resolution: 240 cells per degree.
pub const NX: u64 = 86400;
pub const NY: u64 = 43200;

/// Land cells of a global 1/240 degree grid, stored as a roaring bitmap.
#[derive(Debug, Clone, Default)]
pub struct LandMask {
    pub mask: RoaringTreemap,
}

impl LandMask {
    pub fn new() -> Self {
        Self { mask: RoaringTreemap::new() }
    }

    /// Loads an xz-compressed serialized treemap (e.g. a rasterised GSHHG coastline).
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        info!("Loading land mask from {:?}", path);

        let file = File::open(path)?;
        let decoder = XzDecoder::new(BufReader::new(file));
        let mask = RoaringTreemap::deserialize_from(decoder)?;

        info!("Land mask loaded: {} land cells", mask.len());
        Ok(Self { mask })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut encoder = XzEncoder::new(BufWriter::new(file), 6);
        self.mask.serialize_into(&mut encoder)?;
        encoder.finish()?;
        Ok(())
    }

    fn coords_to_indices(&self, lon: f64, lat: f64) -> (u64, u64) {
        // Affine transform: sa = 240, sc = 43200, se = 240, sf = 21600
        let x = (lon * 240.0 + 43200.0).max(0.0) as u64;
        let y = (lat * 240.0 + 21600.0).max(0.0) as u64;
        (x.clamp(0, NX - 1), y.clamp(0, NY - 1))
    }

    /// Marks a rectangular box of coordinates as land.
    pub fn add_land_box(&mut self, min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) {
        let (min_x, min_y) = self.coords_to_indices(min_lon, min_lat);
        let (max_x, max_y) = self.coords_to_indices(max_lon, max_lat);

        for y in min_y..=max_y {
            self.mask.insert_range(y * NX + min_x..=y * NX + max_x);
        }
    }

    pub fn is_land(&self, position: &Position) -> bool {
        let (x, y) = self.coords_to_indices(position.lon, position.lat);
        self.mask.contains(y * NX + x)
    }
}

impl WaterMask for LandMask {
    fn is_water(&self, position: &Position) -> bool {
        !self.is_land(position)
    }
}
