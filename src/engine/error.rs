use std::fmt;

use thiserror::Error;

/// Axis of a polar table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarAxis {
    WindSpeed,
    WindAngle,
}

impl fmt::Display for PolarAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolarAxis::WindSpeed => write!(f, "wind speed"),
            PolarAxis::WindAngle => write!(f, "wind angle"),
        }
    }
}

/// Errors raised by polar speed queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolarError {
    #[error("{axis} {value:.3} is outside the polar table range [{min}, {max}]")]
    OutOfRange { axis: PolarAxis, value: f64, min: f64, max: f64 },
}

/// Iteration phase a leg failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Expanding,
    BoundaryExtraction,
    TerminationCheck,
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchPhase::Expanding => "expanding",
            SearchPhase::BoundaryExtraction => "boundary extraction",
            SearchPhase::TerminationCheck => "termination check",
        };
        f.write_str(name)
    }
}

/// Errors raised by the routing engine.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("polar lookup failed: {0}")]
    Polar(#[from] PolarError),
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("no route found after {iterations} iterations")]
    SearchExhausted { iterations: usize },
    #[error("no wind data at ({lat:.4}, {lon:.4}) for hour {hour} or any earlier hour")]
    WindUnavailable { lat: f64, lon: f64, hour: u32 },
    #[error("routing cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("broken parent chain: {0}")]
    BrokenChain(String),
    #[error("leg {leg} failed at iteration {iteration} during {phase}: {source}")]
    Leg {
        leg: usize,
        iteration: usize,
        phase: SearchPhase,
        #[source]
        source: Box<RoutingError>,
    },
}

impl RoutingError {
    /// The innermost error, looking through leg context.
    pub fn root_cause(&self) -> &RoutingError {
        match self {
            RoutingError::Leg { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True when the search simply ran out of iterations ("no route found").
    pub fn is_exhausted(&self) -> bool {
        matches!(self.root_cause(), RoutingError::SearchExhausted { .. })
    }

    pub(crate) fn in_leg(self, leg: usize, iteration: usize, phase: SearchPhase) -> Self {
        match self {
            already @ RoutingError::Leg { .. } => already,
            source => RoutingError::Leg { leg, iteration, phase, source: Box::new(source) },
        }
    }
}
