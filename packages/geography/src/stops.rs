//! Stop table loading.
//!
//! Accepts the CTA bus stop export (`SYSTEMSTOP`, `POINT_X`, `POINT_Y`) and
//! GTFS `stops.txt` (`stop_id`, `stop_lon`, `stop_lat`) headers, plus plain
//! `stop_id,x,y`. An optional `weight` (or `visits`, `stop_count`) column
//! carries precomputed scheduled visits.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use transit_density_geography_models::{Crs, StopLayer, StopPoint};

use crate::GeographyError;

#[derive(Debug, Deserialize)]
struct StopRecord {
    #[serde(alias = "SYSTEMSTOP", alias = "systemstop", alias = "STOP_ID")]
    stop_id: String,
    #[serde(alias = "POINT_X", alias = "stop_lon", alias = "lon", alias = "longitude")]
    x: f64,
    #[serde(alias = "POINT_Y", alias = "stop_lat", alias = "lat", alias = "latitude")]
    y: f64,
    #[serde(default, alias = "visits", alias = "stop_count")]
    weight: Option<u64>,
}

impl From<StopRecord> for StopPoint {
    fn from(record: StopRecord) -> Self {
        let stop = Self::new(record.stop_id.trim(), record.x, record.y);
        match record.weight {
            Some(visits) => stop.with_weight(visits),
            None => stop,
        }
    }
}

/// Reads a stop table from any reader.
///
/// # Errors
///
/// Returns [`GeographyError::Csv`] if a required column is missing or a row
/// is malformed, and [`GeographyError::Conversion`] for a non-finite
/// coordinate. `source` names the input in errors.
pub fn read_stops(reader: impl Read, source: &str, crs: Crs) -> Result<StopLayer, GeographyError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let mut features = Vec::new();
    for result in csv_reader.deserialize::<StopRecord>() {
        let record = result.map_err(|e| GeographyError::Csv {
            path: source.to_string(),
            source: e,
        })?;

        if !(record.x.is_finite() && record.y.is_finite()) {
            return Err(GeographyError::Conversion {
                message: format!("stop {} in {source} has a non-finite coordinate", record.stop_id),
            });
        }

        features.push(StopPoint::from(record));
    }

    log::info!("Loaded {} stops from {source} ({crs})", features.len());

    Ok(StopLayer::new(crs, features))
}

/// Loads a stop table from a CSV file.
///
/// # Errors
///
/// Returns [`GeographyError::Io`] if the file cannot be opened, otherwise
/// see [`read_stops`].
pub fn load_stops(path: &Path, crs: Crs) -> Result<StopLayer, GeographyError> {
    let file = std::fs::File::open(path).map_err(|e| GeographyError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    read_stops(std::io::BufReader::new(file), &path.display().to_string(), crs)
}
