#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cluster label, parameter, and summary types.
//!
//! Both clustering methods produce one [`ClusterLabel`] per input stop, in
//! input order, so results from either method can be summarized, written
//! out, and compared the same way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which density clustering method to run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClusterMethod {
    /// Fixed-radius neighbourhood density (`eps` + `min_samples`).
    #[default]
    Dbscan,
    /// Hierarchical density with stability-based cluster selection.
    Hdbscan,
}

/// Cluster assignment for a single stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    /// Not reachable from any dense region.
    Noise,
    /// Member of the cluster with this id. Ids start at 0 and are dense.
    Cluster(u32),
}

impl ClusterLabel {
    /// Integer encoding used in tabular output: `-1` for noise.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Noise => -1,
            Self::Cluster(id) => i64::from(id),
        }
    }

    /// Whether this label is noise.
    #[must_use]
    pub const fn is_noise(self) -> bool {
        matches!(self, Self::Noise)
    }

    /// The cluster id, if any.
    #[must_use]
    pub const fn cluster_id(self) -> Option<u32> {
        match self {
            Self::Noise => None,
            Self::Cluster(id) => Some(id),
        }
    }
}

impl std::fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Parameters for fixed-radius density clustering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DbscanParams {
    /// Neighbourhood radius in CRS units (degrees for lon/lat stops).
    pub eps: f64,
    /// Minimum neighbourhood size, counting the point itself, for a point
    /// to be a core point.
    pub min_samples: usize,
}

impl Default for DbscanParams {
    /// Tuned on the CTA bus stop layer.
    fn default() -> Self {
        Self {
            eps: 0.003,
            min_samples: 10,
        }
    }
}

/// Parameters for hierarchical density clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct HdbscanParams {
    /// Smallest grouping that counts as a cluster rather than noise.
    pub min_cluster_size: usize,
    /// Neighbour count (including the point) used for core distances.
    /// Defaults to `min_cluster_size`.
    pub min_samples: Option<usize>,
}

impl HdbscanParams {
    /// Effective core-distance neighbour count.
    #[must_use]
    pub fn effective_min_samples(&self) -> usize {
        self.min_samples.unwrap_or(self.min_cluster_size)
    }
}

impl Default for HdbscanParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 8,
            min_samples: None,
        }
    }
}

/// Summary scalars for a labelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    /// Number of distinct cluster ids, excluding noise.
    pub cluster_count: usize,
    /// Number of stops labelled noise.
    pub noise_count: usize,
    /// Member count per cluster id.
    pub cluster_sizes: BTreeMap<u32, usize>,
}

impl ClusterSummary {
    /// Tallies a labelling.
    #[must_use]
    pub fn from_labels(labels: &[ClusterLabel]) -> Self {
        let mut cluster_sizes = BTreeMap::new();
        let mut noise_count = 0;

        for label in labels {
            match label {
                ClusterLabel::Noise => noise_count += 1,
                ClusterLabel::Cluster(id) => *cluster_sizes.entry(*id).or_insert(0) += 1,
            }
        }

        Self {
            cluster_count: cluster_sizes.len(),
            noise_count,
            cluster_sizes,
        }
    }

    /// Size of the largest cluster, or 0 if everything is noise.
    #[must_use]
    pub fn largest_cluster(&self) -> usize {
        self.cluster_sizes.values().copied().max().unwrap_or(0)
    }
}
