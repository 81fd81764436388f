#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Density clustering of transit stop locations.
//!
//! Finds natural groupings of stops independent of tract boundaries. Two
//! methods share one contract: coordinates in, one [`ClusterLabel`] per
//! coordinate out, in input order. [`dbscan`] uses a single global density
//! threshold; [`hdbscan`] adapts to clusters of varying density and usually
//! leaves fewer stops as noise on the same layer.
//!
//! Neither method uses randomness, so identical input order and parameters
//! always give identical labels.

pub mod dbscan;
pub mod hdbscan;
mod neighbors;
mod union_find;

use thiserror::Error;
use transit_density_clustering_models::{
    ClusterLabel, ClusterMethod, ClusterSummary, DbscanParams, HdbscanParams,
};

pub use dbscan::dbscan;
pub use hdbscan::hdbscan;

/// Errors that can occur during clustering.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// No points were supplied.
    #[error("Empty input: no points to cluster")]
    EmptyInput,

    /// A clustering parameter is out of range.
    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A point has a NaN or infinite coordinate.
    #[error("Point {index} has a non-finite coordinate")]
    NonFiniteCoordinate {
        /// Input position of the point.
        index: usize,
    },
}

/// Method and parameters for one clustering run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusterParams {
    /// Fixed-radius density clustering.
    Dbscan(DbscanParams),
    /// Hierarchical density clustering.
    Hdbscan(HdbscanParams),
}

impl ClusterParams {
    /// The method these parameters select.
    #[must_use]
    pub const fn method(&self) -> ClusterMethod {
        match self {
            Self::Dbscan(_) => ClusterMethod::Dbscan,
            Self::Hdbscan(_) => ClusterMethod::Hdbscan,
        }
    }
}

/// Labels and summary from one clustering run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    /// One label per input point, in input order.
    pub labels: Vec<ClusterLabel>,
    /// Cluster and noise counts.
    pub summary: ClusterSummary,
}

/// Runs the selected method and logs the cluster and noise counts.
///
/// # Errors
///
/// Returns [`ClusterError`] if the input is empty, contains non-finite
/// coordinates, or the parameters are out of range.
pub fn cluster(points: &[[f64; 2]], params: &ClusterParams) -> Result<Clustering, ClusterError> {
    let labels = match params {
        ClusterParams::Dbscan(p) => dbscan(points, p)?,
        ClusterParams::Hdbscan(p) => hdbscan(points, p)?,
    };
    let summary = ClusterSummary::from_labels(&labels);

    log::info!("Method: {}", params.method());
    log::info!("Estimated number of clusters: {}", summary.cluster_count);
    log::info!("Estimated number of noise points: {}", summary.noise_count);
    log::debug!("Largest cluster: {} points", summary.largest_cluster());

    Ok(Clustering { labels, summary })
}

fn validate_points(points: &[[f64; 2]]) -> Result<(), ClusterError> {
    if points.is_empty() {
        return Err(ClusterError::EmptyInput);
    }
    if let Some(index) = points
        .iter()
        .position(|p| !(p[0].is_finite() && p[1].is_finite()))
    {
        return Err(ClusterError::NonFiniteCoordinate { index });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Square grid of `side * side` points with its lower-left corner at
    /// `origin`, row by row.
    pub fn grid(origin: [f64; 2], side: usize, spacing: f64) -> Vec<[f64; 2]> {
        let mut points = Vec::with_capacity(side * side);
        for row in 0..side {
            for col in 0..side {
                #[allow(clippy::cast_precision_loss)]
                let (x, y) = (col as f64, row as f64);
                points.push([origin[0] + x * spacing, origin[1] + y * spacing]);
            }
        }
        points
    }

    /// Deterministic low-discrepancy scatter over `[0, extent)^2`.
    pub fn scatter(n: usize, extent: f64) -> Vec<[f64; 2]> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let i = i as f64;
                [
                    (i * 0.618_033_988_749_895).fract() * extent,
                    (i * 0.754_877_666_246_693).fract() * extent,
                ]
            })
            .collect()
    }
}
