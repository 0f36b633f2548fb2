// Sail boat polar tables

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::engine::error::{PolarAxis, PolarError};

#[derive(Debug, Error)]
pub enum PolarLoadError {
    #[error("failed to read polar file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse polar table: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid number {value:?} on row {row}")]
    Number { row: usize, value: String },
    #[error("polar table has no {0} breakpoints")]
    Empty(PolarAxis),
    #[error("{0} breakpoints must be strictly increasing")]
    NotIncreasing(PolarAxis),
    #[error("wind angles must lie within [0, 180], found {0}")]
    AngleOutOfDomain(f64),
    #[error("row {row} has {found} speeds, expected {expected}")]
    Shape { row: usize, found: usize, expected: usize },
}

/// Boat speed table: `speeds[twa_idx][tws_idx]` in knots.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarTable {
    /// True wind speeds (knots)
    tws: Vec<f64>,
    /// True wind angles (degrees, 0-180)
    twa: Vec<f64>,
    speeds: Vec<Vec<f64>>,
}

enum Bracket {
    Exact(usize),
    Between { lower: usize, upper: usize, t: f64 },
}

fn locate(axis_values: &[f64], value: f64, axis: PolarAxis) -> Result<Bracket, PolarError> {
    let min = axis_values[0];
    let max = axis_values[axis_values.len() - 1];
    // also rejects NaN
    if !(value >= min && value <= max) {
        return Err(PolarError::OutOfRange { axis, value, min, max });
    }

    let idx = axis_values.partition_point(|&b| b < value);
    if axis_values[idx] == value {
        return Ok(Bracket::Exact(idx));
    }
    let (lower, upper) = (idx - 1, idx);
    let t = (value - axis_values[lower]) / (axis_values[upper] - axis_values[lower]);
    Ok(Bracket::Between { lower, upper, t })
}

fn strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

fn parse_cell(row: usize, cell: &str) -> Result<f64, PolarLoadError> {
    cell.replace(',', ".")
        .parse()
        .map_err(|_| PolarLoadError::Number { row, value: cell.to_string() })
}

impl PolarTable {
    pub fn new(tws: Vec<f64>, twa: Vec<f64>, speeds: Vec<Vec<f64>>) -> Result<Self, PolarLoadError> {
        if tws.is_empty() {
            return Err(PolarLoadError::Empty(PolarAxis::WindSpeed));
        }
        if twa.is_empty() {
            return Err(PolarLoadError::Empty(PolarAxis::WindAngle));
        }
        if !strictly_increasing(&tws) {
            return Err(PolarLoadError::NotIncreasing(PolarAxis::WindSpeed));
        }
        if !strictly_increasing(&twa) {
            return Err(PolarLoadError::NotIncreasing(PolarAxis::WindAngle));
        }
        if let Some(&bad) = twa.iter().find(|&&a| !(0.0..=180.0).contains(&a)) {
            return Err(PolarLoadError::AngleOutOfDomain(bad));
        }
        if speeds.len() != twa.len() {
            return Err(PolarLoadError::Shape { row: speeds.len(), found: 0, expected: tws.len() });
        }
        for (row, values) in speeds.iter().enumerate() {
            if values.len() != tws.len() {
                return Err(PolarLoadError::Shape { row, found: values.len(), expected: tws.len() });
            }
        }
        Ok(Self { tws, twa, speeds })
    }

    /// Parses a `.pol`/CSV polar: header `label, tws...`, then rows `twa, speed...`.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, PolarLoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut tws: Option<Vec<f64>> = None;
        let mut twa = Vec::new();
        let mut speeds = Vec::new();

        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }

            match tws {
                None => {
                    // First cell is the "TWA\TWS" label, possibly empty
                    let header = record
                        .iter()
                        .skip(1)
                        .filter(|cell| !cell.is_empty())
                        .map(|cell| parse_cell(row, cell))
                        .collect::<Result<Vec<f64>, _>>()?;
                    tws = Some(header);
                }
                Some(_) => {
                    let cells: Vec<&str> = record.iter().filter(|cell| !cell.is_empty()).collect();
                    twa.push(parse_cell(row, cells[0])?);
                    let row_speeds = cells[1..]
                        .iter()
                        .map(|cell| parse_cell(row, cell))
                        .collect::<Result<Vec<f64>, _>>()?;
                    speeds.push(row_speeds);
                }
            }
        }

        Self::new(tws.unwrap_or_default(), twa, speeds)
    }

    pub fn load<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self, PolarLoadError> {
        info!("Loading polar data from: {:?}", path.as_ref());
        let file = File::open(path)?;
        let table = Self::from_reader(file, delimiter)?;
        info!("Polar loaded: {} TWA, {} TWS breakpoints", table.twa.len(), table.tws.len());
        Ok(table)
    }

    pub fn wind_speeds(&self) -> &[f64] {
        &self.tws
    }

    pub fn wind_angles(&self) -> &[f64] {
        &self.twa
    }

    /// Folds any angle-to-wind into [0, 180]; polars are symmetric about the wind axis.
    pub fn fold_angle(angle_deg: f64) -> f64 {
        let a = angle_deg.rem_euclid(360.0);
        if a > 180.0 { 360.0 - a } else { a }
    }

    /// Boat speed (knots) for a true wind speed and angle-to-wind.
    ///
    /// Interpolates across the wind axis first, then across the angle axis of the
    /// resulting curve. Queries outside the breakpoints are errors, never clamped.
    pub fn boat_speed(&self, tws_kts: f64, twa_deg: f64) -> Result<f64, PolarError> {
        let angle = Self::fold_angle(twa_deg);
        let wind = locate(&self.tws, tws_kts, PolarAxis::WindSpeed)?;
        let row = locate(&self.twa, angle, PolarAxis::WindAngle)?;

        let curve_at = |twa_idx: usize| -> f64 {
            let cells = &self.speeds[twa_idx];
            match wind {
                Bracket::Exact(i) => cells[i],
                Bracket::Between { lower, upper, t } => cells[lower] + t * (cells[upper] - cells[lower]),
            }
        };

        Ok(match row {
            Bracket::Exact(j) => curve_at(j),
            Bracket::Between { lower, upper, t } => {
                let low = curve_at(lower);
                low + t * (curve_at(upper) - low)
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_POLAR: &str = "\
TWA\\TWS;0;10;15;20;30
0;0;0;0;0;0
30;0;3.5;4.5;5;5.2
45;0;5.5;6.5;7;7.2
60;0;6.5;7.5;8;8.3
90;0;7.2;8;8.6;9
120;0;7;7.8;8.5;9.2
150;0;5.8;6.8;7.8;8.8
180;0;5;6;7;8
";

    pub(crate) fn sample_polar() -> PolarTable {
        PolarTable::from_reader(SAMPLE_POLAR.as_bytes(), b';').unwrap()
    }

    #[test]
    fn test_parse_semicolon_polar() {
        let polar = sample_polar();
        assert_eq!(polar.wind_speeds(), &[0.0, 10.0, 15.0, 20.0, 30.0]);
        assert_eq!(polar.wind_angles().len(), 8);
        assert_eq!(polar.boat_speed(15.0, 90.0).unwrap(), 8.0);
    }

    #[test]
    fn test_parse_tab_polar_with_decimal_commas_and_blank_lines() {
        let text = "twa/tws\t6\t12\t\n\n0\t0\t0\n90\t5,5\t7,25\n180\t4\t6\n";
        let polar = PolarTable::from_reader(text.as_bytes(), b'\t').unwrap();
        assert_eq!(polar.wind_speeds(), &[6.0, 12.0]);
        assert_eq!(polar.boat_speed(12.0, 90.0).unwrap(), 7.25);
    }

    #[test]
    fn test_header_without_corner_label() {
        let text = ";0;10;15\n0;0;0;0\n90;0;7.2;8\n180;0;5;6\n";
        let polar = PolarTable::from_reader(text.as_bytes(), b';').unwrap();
        assert_eq!(polar.wind_speeds(), &[0.0, 10.0, 15.0]);
        assert_eq!(polar.boat_speed(15.0, 90.0).unwrap(), 8.0);
        assert_eq!(polar.boat_speed(10.0, 180.0).unwrap(), 5.0);
    }

    #[test]
    fn test_breakpoints_are_exact() {
        let polar = sample_polar();
        for (j, &angle) in polar.wind_angles().iter().enumerate() {
            for (i, &wind) in polar.wind_speeds().iter().enumerate() {
                assert_eq!(polar.boat_speed(wind, angle).unwrap(), polar.speeds[j][i]);
            }
        }
    }

    #[test]
    fn test_interpolation_between_wind_columns_is_bracketed() {
        let polar = sample_polar();
        let at_10 = polar.boat_speed(10.0, 60.0).unwrap();
        let at_15 = polar.boat_speed(15.0, 60.0).unwrap();
        let mut previous = at_10;
        for step in 1..10 {
            let wind = 10.0 + step as f64 * 0.5;
            let speed = polar.boat_speed(wind, 60.0).unwrap();
            assert!(speed >= previous);
            assert!(speed >= at_10 && speed <= at_15);
            previous = speed;
        }
        assert!((polar.boat_speed(12.5, 60.0).unwrap() - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_interpolation_across_both_axes() {
        let polar = sample_polar();
        // Midway between 60 and 90 degrees at 12.5 knots: (7.0 + 7.6) / 2
        let speed = polar.boat_speed(12.5, 75.0).unwrap();
        assert!((speed - 7.3).abs() < 1e-12);
    }

    #[test]
    fn test_angles_fold_symmetrically() {
        let polar = sample_polar();
        let starboard = polar.boat_speed(15.0, 120.0).unwrap();
        assert_eq!(polar.boat_speed(15.0, -120.0).unwrap(), starboard);
        assert_eq!(polar.boat_speed(15.0, 240.0).unwrap(), starboard);
        assert_eq!(polar.boat_speed(15.0, -240.0).unwrap(), starboard);
        assert_eq!(PolarTable::fold_angle(350.0), 10.0);
        assert_eq!(PolarTable::fold_angle(180.0), 180.0);
    }

    #[test]
    fn test_out_of_range_is_reported() {
        let polar = sample_polar();
        assert!(matches!(
            polar.boat_speed(31.0, 90.0),
            Err(PolarError::OutOfRange { axis: PolarAxis::WindSpeed, .. })
        ));
        assert!(matches!(
            polar.boat_speed(-1.0, 90.0),
            Err(PolarError::OutOfRange { axis: PolarAxis::WindSpeed, .. })
        ));
        assert!(polar.boat_speed(f64::NAN, 90.0).is_err());

        let narrow = PolarTable::new(vec![5.0, 10.0], vec![40.0, 180.0], vec![vec![3.0, 5.0], vec![4.0, 6.0]]).unwrap();
        assert!(matches!(
            narrow.boat_speed(8.0, 20.0),
            Err(PolarError::OutOfRange { axis: PolarAxis::WindAngle, .. })
        ));
    }

    #[test]
    fn test_rejects_malformed_tables() {
        assert!(matches!(
            PolarTable::new(vec![10.0, 5.0], vec![0.0, 180.0], vec![vec![1.0, 1.0], vec![1.0, 1.0]]),
            Err(PolarLoadError::NotIncreasing(PolarAxis::WindSpeed))
        ));
        assert!(matches!(
            PolarTable::new(vec![5.0, 10.0], vec![0.0, 180.0], vec![vec![1.0, 1.0], vec![1.0]]),
            Err(PolarLoadError::Shape { row: 1, .. })
        ));
        assert!(matches!(
            PolarTable::new(vec![5.0], vec![0.0, 200.0], vec![vec![1.0], vec![1.0]]),
            Err(PolarLoadError::AngleOutOfDomain(_))
        ));
        assert!(matches!(
            PolarTable::from_reader("a;5;x\n0;1;2\n".as_bytes(), b';'),
            Err(PolarLoadError::Number { .. })
        ));
        assert!(matches!(
            PolarTable::from_reader("".as_bytes(), b';'),
            Err(PolarLoadError::Empty(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_POLAR.as_bytes()).unwrap();
        let polar = PolarTable::load(file.path(), b';').unwrap();
        assert_eq!(polar, sample_polar());
    }
}
