#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Loads transit stops and census tract boundaries into typed layers.
//!
//! Stops come from a CSV table (a CTA stop export or a GTFS `stops.txt`);
//! tracts come from a `GeoJSON` `FeatureCollection`. Neither loader
//! reprojects: both layers must already share a CRS, which the join checks.

pub mod stops;
pub mod tracts;

use thiserror::Error;

pub use stops::{load_stops, read_stops};
pub use tracts::{TractOptions, load_tracts, parse_tracts};

/// Errors that can occur while loading geography.
#[derive(Debug, Error)]
pub enum GeographyError {
    /// I/O error reading a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// `GeoJSON` parsing error.
    #[error("GeoJSON error in {path}: {source}")]
    GeoJson {
        /// Path to the `GeoJSON` file.
        path: String,
        /// Underlying parse error.
        source: Box<geojson::Error>,
    },

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A tract cannot be used as a region.
    #[error("Invalid region {region_id}: {reason}")]
    InvalidRegion {
        /// Region identifier, or feature position when it has none.
        region_id: String,
        /// What is wrong with it.
        reason: String,
    },
}
