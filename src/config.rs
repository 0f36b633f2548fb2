use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::error::RoutingError;
use crate::engine::hull::HullConfig;
use crate::engine::mask::LandMask;
use crate::engine::models::{NavigationBounds, Position, WindData};
use crate::engine::wind::{ConstantWind, WindField, WindSample, WindSource};
use crate::parsers::polars::{PolarLoadError, PolarTable};

/// Search parameters, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub time_step_hours: f64,
    pub heading_step_deg: f64,
    pub arrival_tolerance_deg: f64,
    pub elimination_radius_deg: f64,
    pub bounds: NavigationBounds,
    /// Avoid land using the water mask instead of forcing progress toward the target.
    pub land_contact: bool,
    pub max_iterations: usize,
    /// Expansion pool size, rayon's default when unset.
    pub worker_threads: Option<usize>,
    /// Simulated hour of the first leg's departure.
    pub start_hour: f64,
    pub hull: HullConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            time_step_hours: 0.25,
            heading_step_deg: 10.0,
            arrival_tolerance_deg: 0.05,
            elimination_radius_deg: 0.02,
            bounds: NavigationBounds::default(),
            land_contact: false,
            max_iterations: 2000,
            worker_threads: None,
            start_hour: 0.0,
            hull: HullConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), RoutingError> {
        let invalid = |reason: String| -> Result<(), RoutingError> { Err(RoutingError::InvalidConfig(reason)) };

        if !(self.time_step_hours > 0.0) {
            return invalid(format!("time step must be positive, got {}", self.time_step_hours));
        }
        if !(self.heading_step_deg > 0.0 && self.heading_step_deg < 360.0) {
            return invalid(format!("heading step must lie in (0, 360), got {}", self.heading_step_deg));
        }
        if !(self.arrival_tolerance_deg >= 0.0) {
            return invalid(format!("arrival tolerance must be non-negative, got {}", self.arrival_tolerance_deg));
        }
        if !(self.elimination_radius_deg >= 0.0) {
            return invalid(format!("elimination radius must be non-negative, got {}", self.elimination_radius_deg));
        }
        if !self.bounds.is_valid() {
            return invalid(format!("navigation bounds are inverted: {:?}", self.bounds));
        }
        if self.max_iterations == 0 {
            return invalid("max iterations must be at least 1".to_string());
        }
        if !(self.start_hour >= 0.0) {
            return invalid(format!("start hour must be non-negative, got {}", self.start_hour));
        }
        if self.worker_threads == Some(0) {
            return invalid("worker threads must be at least 1".to_string());
        }
        if !(self.hull.min_angle_deg < self.hull.max_angle_deg) {
            return invalid(format!(
                "hull angle window is empty: min {} >= max {}",
                self.hull.min_angle_deg, self.hull.max_angle_deg
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid run config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Router(#[from] RoutingError),
    #[error("failed to load polar: {0}")]
    Polar(#[from] PolarLoadError),
    #[error("failed to load land mask {path:?}: {source}")]
    Mask {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn default_delimiter() -> char {
    ';'
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarSource {
    pub path: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl PolarSource {
    pub fn load(&self) -> Result<PolarTable, ConfigError> {
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::Invalid(format!("polar delimiter {:?} is not ASCII", self.delimiter)));
        }
        Ok(PolarTable::load(&self.path, self.delimiter as u8)?)
    }
}

/// Wind input: `{"constant": {...}}` or `{"samples": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindConfig {
    Constant(WindData),
    Samples(Vec<WindSample>),
}

impl WindConfig {
    pub fn build(&self) -> Result<Box<dyn WindSource>, ConfigError> {
        match self {
            WindConfig::Constant(wind) => Ok(Box::new(ConstantWind(*wind))),
            WindConfig::Samples(samples) => {
                if samples.is_empty() {
                    return Err(ConfigError::Invalid("wind sample list is empty".to_string()));
                }
                let field = WindField::from_samples(samples);
                info!("Wind field built: {} samples over {} hours", samples.len(), field.hours().count());
                Ok(Box::new(field))
            }
        }
    }
}

/// Everything the command line router needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub router: RouterConfig,
    pub waypoints: Vec<Position>,
    pub polar: PolarSource,
    pub wind: WindConfig,
    #[serde(default)]
    pub land_mask: Option<PathBuf>,
    /// Wall-clock time of simulated hour 0.
    #[serde(default)]
    pub departure: Option<DateTime<Utc>>,
}

impl RunConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        info!("Loading run config from {:?}", path.as_ref());
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.router.validate()?;
        if self.waypoints.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "need at least 2 waypoints, got {}",
                self.waypoints.len()
            )));
        }
        if self.router.land_contact && self.land_mask.is_none() {
            return Err(ConfigError::Invalid("land_contact requires a land_mask path".to_string()));
        }
        Ok(())
    }

    pub fn load_land_mask(&self) -> Result<Option<LandMask>, ConfigError> {
        self.land_mask
            .as_ref()
            .map(|path| LandMask::load(path).map_err(|source| ConfigError::Mask { path: path.clone(), source }))
            .transpose()
    }
}
