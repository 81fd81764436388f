#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sums per-stop service into per-tract observed counts.
//!
//! Each stop carries a weight: one for a plain stop count, or its number of
//! scheduled visits (see [`schedule`]). A stop joined to several tracts
//! (e.g. on a shared boundary) adds its full weight to every one of them.

pub mod schedule;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use transit_density_analytics_models::RegionAggregateInput;
use transit_density_geography_models::{RegionLayer, StopLayer};
use transit_density_spatial::{JoinResult, SpatialError};

/// Errors that can occur while aggregating service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The join refers to a stop that has no weight.
    #[error("Point index {index} out of range for {len} weights")]
    PointIndexOutOfRange {
        /// Offending stop index.
        index: usize,
        /// Number of weights supplied.
        len: usize,
    },

    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// I/O error opening a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Spatial join failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

/// What a stop contributes to its tracts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WeightMode {
    /// Every stop counts once.
    Count,
    /// Stops count their scheduled visits; unweighted stops count once.
    #[default]
    Scheduled,
}

/// Per-stop weights in stop input order.
#[must_use]
pub fn stop_weights(stops: &StopLayer, mode: WeightMode) -> Vec<u64> {
    stops
        .features
        .iter()
        .map(|stop| match mode {
            WeightMode::Count => 1,
            WeightMode::Scheduled => stop.weight_or_unit(),
        })
        .collect()
}

/// Sums `weights[point_index]` into every region the point was joined to.
///
/// Regions that received no stops are absent from the result.
///
/// # Errors
///
/// Returns [`ServiceError::PointIndexOutOfRange`] if the join mentions a
/// stop index with no corresponding weight.
pub fn aggregate(join: &JoinResult, weights: &[u64]) -> Result<BTreeMap<String, u64>, ServiceError> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();

    for assignment in &join.assignments {
        let weight = *weights
            .get(assignment.point_index)
            .ok_or(ServiceError::PointIndexOutOfRange {
                index: assignment.point_index,
                len: weights.len(),
            })?;

        for region_id in &assignment.region_ids {
            *counts.entry(region_id.clone()).or_default() += weight;
        }
    }

    log::debug!(
        "Aggregated {} stops into {} regions ({} total weight)",
        join.assignments.len(),
        counts.len(),
        counts.values().sum::<u64>(),
    );

    Ok(counts)
}

/// Pairs every region with its aggregated count, in region input order.
///
/// Regions that received no stops get `None`, which the intensity model
/// treats as zero.
#[must_use]
pub fn observed_inputs(
    regions: &RegionLayer,
    counts: &BTreeMap<String, u64>,
) -> Vec<RegionAggregateInput> {
    regions
        .features
        .iter()
        .map(|region| {
            RegionAggregateInput::new(
                region.region_id.clone(),
                region.area_km2,
                counts.get(&region.region_id).copied(),
            )
        })
        .collect()
}

/// Joins stops onto regions and returns intensity-model inputs.
///
/// # Errors
///
/// Returns [`ServiceError::Spatial`] if the join fails (empty layers,
/// CRS mismatch, duplicate region ids).
pub fn observed_service(
    stops: &StopLayer,
    regions: &RegionLayer,
    join_mode: transit_density_spatial::JoinMode,
    weight_mode: WeightMode,
) -> Result<Vec<RegionAggregateInput>, ServiceError> {
    let join = transit_density_spatial::join(stops, regions, join_mode)?;
    let counts = aggregate(&join, &stop_weights(stops, weight_mode))?;
    Ok(observed_inputs(regions, &counts))
}
