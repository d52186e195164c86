//! Source catalogues: entries with sky positions, position errors and
//! named value columns (typically magnitudes).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};
use crate::Vector3;

/// Area of the full celestial sphere in square degrees.
pub const FULL_SKY_DEG2: f64 = 4.0 * PI * (180.0 / PI) * (180.0 / PI);

/// Default value marking an undefined magnitude.
pub const DEFAULT_MAG_SENTINEL: f64 = -99.0;

/// A single catalogue row.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Source identifier. Required for the primary catalogue only.
    pub id: Option<String>,
    pub ra_deg: f64,
    pub dec_deg: f64,
    /// One value per catalogue column, `NaN` where missing.
    pub values: Vec<f64>,
}

impl Entry {
    pub fn new(id: Option<String>, ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            id,
            ra_deg,
            dec_deg,
            values: Vec::new(),
        }
    }

    /// Attach column values, in catalogue column order.
    pub fn with_values(mut self, values: Vec<f64>) -> Self {
        self.values = values;
        self
    }

    /// Unit vector pointing to the entry's position on the celestial sphere.
    pub fn uvec(&self) -> Vector3 {
        radec_to_uvec(self.ra_deg.to_radians(), self.dec_deg.to_radians())
    }
}

/// Where the positional uncertainty of a catalogue's entries comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PositionError {
    /// The same 1-sigma error (arcsec) for every entry.
    Fixed(f64),
    /// Per-entry 1-sigma error (arcsec) read from the named column.
    Column(String),
}

impl std::str::FromStr for PositionError {
    type Err = String;

    /// Parse `0.5` as a fixed error or `:Pos_error` as a column reference.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(column) = s.strip_prefix(':') {
            if column.is_empty() {
                return Err("empty position error column name".to_string());
            }
            return Ok(PositionError::Column(column.to_string()));
        }
        s.parse::<f64>()
            .map(PositionError::Fixed)
            .map_err(|e| format!("invalid position error '{s}': {e}"))
    }
}

/// An immutable, named catalogue of entries covering a known sky area.
#[derive(Debug, Clone)]
pub struct Catalogue {
    name: String,
    sky_area_deg2: f64,
    columns: Vec<String>,
    entries: Vec<Entry>,
    position_error: PositionError,
    mag_sentinel: f64,
}

impl Catalogue {
    /// Build a catalogue. Entry values must follow the order of `columns`;
    /// short value vectors are padded with `NaN`.
    pub fn new(
        name: impl Into<String>,
        sky_area_deg2: f64,
        columns: Vec<String>,
        mut entries: Vec<Entry>,
        position_error: PositionError,
    ) -> Self {
        let ncols = columns.len();
        for entry in &mut entries {
            entry.values.resize(ncols, f64::NAN);
        }
        Self {
            name: name.into(),
            sky_area_deg2,
            columns,
            entries,
            position_error,
            mag_sentinel: DEFAULT_MAG_SENTINEL,
        }
    }

    /// Override the value that marks an undefined magnitude.
    pub fn with_mag_sentinel(mut self, sentinel: f64) -> Self {
        self.mag_sentinel = sentinel;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sky_area_deg2(&self) -> f64 {
        self.sky_area_deg2
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn position_error(&self) -> &PositionError {
        &self.position_error
    }

    pub fn mag_sentinel(&self) -> f64 {
        self.mag_sentinel
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of a named column.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, column: usize) -> Vec<f64> {
        self.entries.iter().map(|e| e.values[column]).collect()
    }

    /// Full-sky-normalised source density: `len / area * FULL_SKY_DEG2`.
    pub fn source_density(&self) -> Result<f64> {
        if !(self.sky_area_deg2.is_finite() && self.sky_area_deg2 > 0.0) {
            return Err(MatchError::InvalidSkyArea {
                catalogue: self.name.clone(),
                area: self.sky_area_deg2,
            });
        }
        if self.is_empty() {
            return Err(MatchError::EmptyCatalogue(self.name.clone()));
        }
        Ok(self.len() as f64 / self.sky_area_deg2 * FULL_SKY_DEG2)
    }

    /// Resolve the position error source into a per-row lookup.
    pub(crate) fn error_source(&self) -> Result<ErrorSource> {
        match &self.position_error {
            PositionError::Fixed(sigma) => Ok(ErrorSource::Fixed(*sigma)),
            PositionError::Column(column) => self
                .column_index(column)
                .map(ErrorSource::Column)
                .ok_or_else(|| MatchError::UnknownErrorColumn {
                    catalogue: self.name.clone(),
                    column: column.clone(),
                }),
        }
    }
}

/// Position error lookup validated against a catalogue's columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ErrorSource {
    Fixed(f64),
    Column(usize),
}

impl ErrorSource {
    /// 1-sigma error (arcsec) of a row, rejecting non-positive or non-finite values.
    pub(crate) fn sigma(&self, catalogue: &Catalogue, row: usize) -> Result<f64> {
        let value = match *self {
            ErrorSource::Fixed(sigma) => sigma,
            ErrorSource::Column(col) => catalogue.entries[row].values[col],
        };
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(MatchError::InvalidPositionError {
                catalogue: catalogue.name.clone(),
                row,
                value,
            })
        }
    }
}

pub(crate) fn radec_to_uvec(ra_rad: f64, dec_rad: f64) -> Vector3 {
    let (sin_ra, cos_ra) = ra_rad.sin_cos();
    let (sin_dec, cos_dec) = dec_rad.sin_cos();
    Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
}

/// Great-circle angle between two unit vectors, in radians.
///
/// Uses `atan2(|a × b|, a · b)`, which stays accurate for sub-arcsecond angles
/// where `acos` of the dot product loses precision.
pub fn angular_separation(a: &Vector3, b: &Vector3) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_catalogue(n: usize, area: f64) -> Catalogue {
        let entries = (0..n)
            .map(|i| Entry::new(Some(format!("s{i}")), i as f64 * 0.01, 0.0))
            .collect();
        Catalogue::new("A", area, vec![], entries, PositionError::Fixed(0.5))
    }

    #[test]
    fn density_is_normalised_to_full_sky() {
        let cat = small_catalogue(10, FULL_SKY_DEG2);
        assert!((cat.source_density().unwrap() - 10.0).abs() < 1e-9);

        let cat = small_catalogue(10, 1.0);
        assert!((cat.source_density().unwrap() - 10.0 * FULL_SKY_DEG2).abs() < 1e-6);
    }

    #[test]
    fn density_rejects_empty_and_bad_area() {
        assert_eq!(
            small_catalogue(0, 1.0).source_density(),
            Err(MatchError::EmptyCatalogue("A".into()))
        );
        assert!(matches!(
            small_catalogue(3, 0.0).source_density(),
            Err(MatchError::InvalidSkyArea { .. })
        ));
    }

    #[test]
    fn parse_position_error() {
        assert_eq!("0.5".parse::<PositionError>(), Ok(PositionError::Fixed(0.5)));
        assert_eq!(
            ":Pos_error".parse::<PositionError>(),
            Ok(PositionError::Column("Pos_error".into()))
        );
        assert!(":".parse::<PositionError>().is_err());
        assert!("abc".parse::<PositionError>().is_err());
    }

    #[test]
    fn error_column_sigma_is_validated() {
        let entries = vec![
            Entry::new(None, 0.0, 0.0).with_values(vec![0.3]),
            Entry::new(None, 0.0, 0.0).with_values(vec![0.0]),
        ];
        let cat = Catalogue::new(
            "B",
            1.0,
            vec!["err".into()],
            entries,
            PositionError::Column("err".into()),
        );
        let src = cat.error_source().unwrap();
        assert_eq!(src.sigma(&cat, 0), Ok(0.3));
        assert!(matches!(
            src.sigma(&cat, 1),
            Err(MatchError::InvalidPositionError { row: 1, .. })
        ));

        let bad = Catalogue::new("C", 1.0, vec![], vec![], PositionError::Column("x".into()));
        assert!(matches!(
            bad.error_source(),
            Err(MatchError::UnknownErrorColumn { .. })
        ));
    }

    #[test]
    fn separation_is_accurate_for_tiny_angles() {
        let arcsec = 1.0_f64 / 3600.0;
        let a = radec_to_uvec(0.0, 0.0);
        let b = radec_to_uvec(0.0, (0.2 * arcsec).to_radians());
        let sep_arcsec = angular_separation(&a, &b).to_degrees() * 3600.0;
        assert!((sep_arcsec - 0.2).abs() < 1e-9);
        assert_eq!(angular_separation(&a, &a), 0.0);
    }
}
