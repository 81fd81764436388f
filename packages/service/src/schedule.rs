//! Scheduled stop visits from a GTFS `stop_times.txt` feed.
//!
//! Every row of `stop_times.txt` is one scheduled visit of a trip to a
//! stop, so a stop's weight is simply the number of rows naming it.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use transit_density_geography_models::StopLayer;

use crate::ServiceError;

/// The only `stop_times.txt` column this module needs. Other columns are
/// ignored in any order.
#[derive(Debug, Deserialize)]
struct StopTimeRecord {
    stop_id: String,
}

/// Counts scheduled visits per stop from a `stop_times.txt` reader.
///
/// # Errors
///
/// Returns [`ServiceError::Csv`] if the header lacks `stop_id` or a row
/// cannot be read. `source` names the input in the error.
pub fn count_scheduled_visits(
    reader: impl Read,
    source: &str,
) -> Result<BTreeMap<String, u64>, ServiceError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let mut visits: BTreeMap<String, u64> = BTreeMap::new();
    let mut rows = 0u64;
    for result in csv_reader.deserialize::<StopTimeRecord>() {
        let record = result.map_err(|e| ServiceError::Csv {
            path: source.to_string(),
            source: e,
        })?;
        *visits.entry(record.stop_id.trim().to_string()).or_default() += 1;
        rows += 1;
    }

    log::info!("Read {rows} scheduled visits across {} stops from {source}", visits.len());

    Ok(visits)
}

/// Counts scheduled visits per stop from a `stop_times.txt` file.
///
/// # Errors
///
/// Returns [`ServiceError::Io`] if the file cannot be opened, otherwise
/// see [`count_scheduled_visits`].
pub fn count_scheduled_visits_from_path(path: &Path) -> Result<BTreeMap<String, u64>, ServiceError> {
    let file = std::fs::File::open(path).map_err(|e| ServiceError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    count_scheduled_visits(std::io::BufReader::new(file), &path.display().to_string())
}

/// Sets each stop's weight to its visit count and drops stops with no
/// scheduled visits.
#[must_use]
pub fn attach_scheduled_visits(stops: StopLayer, visits: &BTreeMap<String, u64>) -> StopLayer {
    let before = stops.len();
    let features: Vec<_> = stops
        .features
        .into_iter()
        .filter_map(|stop| {
            visits
                .get(&stop.stop_id)
                .map(|&count| stop.with_weight(count))
        })
        .collect();

    if features.len() < before {
        log::warn!(
            "{} of {before} stops have no scheduled visits and were dropped",
            before - features.len()
        );
    }

    StopLayer::new(stops.crs, features)
}
