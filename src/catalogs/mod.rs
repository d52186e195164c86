//! Readers for on-disk catalogue formats.

pub mod csv_catalogue;

pub use csv_catalogue::{load_catalogue_csv, parse_catalogue_csv};
