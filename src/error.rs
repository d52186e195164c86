//! Error type shared by every stage of the matching pipeline.

use thiserror::Error;

/// Errors raised while validating inputs or running the association pipeline.
///
/// Configuration problems are detected before any matching work starts; data
/// problems are reported at the first point a catalogue's values are used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("at least two catalogues are required, got {0}")]
    TooFewCatalogues(usize),
    #[error("catalogue name '{0}' is used more than once")]
    DuplicateCatalogue(String),
    #[error("match radius must be positive and finite, got {0} arcsec")]
    InvalidRadius(f64),
    #[error("magnitude radius must be positive and finite, got {0} arcsec")]
    InvalidMagRadius(f64),
    #[error("prior completeness must lie in (0, 1], got {0}")]
    InvalidCompleteness(f64),
    #[error("{name} must be a finite value >= 0, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("histogram needs at least 3 edge points, got {0}")]
    InvalidHistogramEdges(usize),
    #[error("malformed magnitude spec '{0}', expected <catalogue>:<column>")]
    MalformedMagnitudeSpec(String),
    #[error("catalogue '{catalogue}' referenced by '{spec}' is unknown; known catalogues: {known}")]
    UnknownCatalogue {
        spec: String,
        catalogue: String,
        known: String,
    },
    #[error("column '{column}' referenced by '{spec}' is unknown in catalogue '{catalogue}'; known columns: {known}")]
    UnknownColumn {
        spec: String,
        catalogue: String,
        column: String,
        known: String,
    },
    #[error("position error column '{column}' is unknown in catalogue '{catalogue}'")]
    UnknownErrorColumn { catalogue: String, column: String },
    #[error("primary catalogue '{catalogue}' has no identifier for row {row}")]
    MissingPrimaryId { catalogue: String, row: usize },
    #[error("catalogue '{0}' has no entries, its source density is undefined")]
    EmptyCatalogue(String),
    #[error("catalogue '{catalogue}' has invalid sky area {area} deg^2")]
    InvalidSkyArea { catalogue: String, area: f64 },
    #[error("catalogue '{catalogue}' row {row} has invalid position error {value} arcsec")]
    InvalidPositionError {
        catalogue: String,
        row: usize,
        value: f64,
    },
    #[error("prior {0:e} is outside (0, 1); check catalogue sky areas and completeness")]
    InvalidPrior(f64),
}

pub type Result<T> = std::result::Result<T, MatchError>;
