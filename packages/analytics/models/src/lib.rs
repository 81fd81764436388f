#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types for tract-level service density analysis.
//!
//! A [`RegionAggregateInput`] is what the service aggregation step hands to
//! the intensity model; a [`RegionAggregate`] is what comes back, with the
//! expected count under a uniform intensity and the tract's
//! [`Significance`] class. [`BoxBreaks`] describe the box-map classes used
//! to bin raw service counts.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Observed service for one tract, before modelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAggregateInput {
    /// Region identifier.
    pub region_id: String,
    /// Area in square kilometres.
    pub area_km2: f64,
    /// Summed stop weight. `None` (no stops joined) counts as zero.
    pub observed_count: Option<u64>,
}

impl RegionAggregateInput {
    /// Creates an input row.
    #[must_use]
    pub fn new(region_id: impl Into<String>, area_km2: f64, observed_count: Option<u64>) -> Self {
        Self {
            region_id: region_id.into(),
            area_km2,
            observed_count,
        }
    }
}

/// How a tract's observed service compares to its expectation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Significance {
    /// Significantly more service than a uniform intensity predicts.
    MoreThanExpected,
    /// Significantly less service than a uniform intensity predicts.
    LessThanExpected,
    /// No significant deviation.
    NonSignificant,
}

impl Significance {
    /// Legend text for maps and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MoreThanExpected => "More than expected",
            Self::LessThanExpected => "Less than expected",
            Self::NonSignificant => "Non-significant",
        }
    }
}

/// Modelled statistics for one tract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAggregate {
    /// Region identifier.
    pub region_id: String,
    /// Area in square kilometres.
    pub area_km2: f64,
    /// Summed stop weight.
    pub observed_count: u64,
    /// Fitted intensity times area.
    pub expected_count: f64,
    /// Poisson probability of exactly `observed_count` given
    /// `expected_count`.
    pub p_value: f64,
    /// Classification at the report's significance threshold.
    pub significance: Significance,
}

/// Output of one intensity assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntensityReport {
    /// Fitted intensity: total observed over total area (per km²).
    pub intensity: f64,
    /// Sum of observed counts.
    pub total_observed: u64,
    /// Sum of areas in km².
    pub total_area_km2: f64,
    /// Significance threshold used for classification.
    pub alpha: f64,
    /// Number of tracts classified [`Significance::MoreThanExpected`].
    pub more_than_expected: usize,
    /// Number of tracts classified [`Significance::LessThanExpected`].
    pub less_than_expected: usize,
    /// Number of tracts classified [`Significance::NonSignificant`].
    pub non_significant: usize,
    /// Per-tract rows in input order.
    pub regions: Vec<RegionAggregate>,
}

/// Box-map class of a value relative to [`BoxBreaks`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BoxCategory {
    /// Below the lower fence.
    LowerOutlier,
    /// Between the lower fence and the first quartile.
    Below25,
    /// Between the first quartile and the median.
    From25To50,
    /// Between the median and the third quartile.
    From50To75,
    /// Between the third quartile and the upper fence.
    Above75,
    /// Above the upper fence.
    UpperOutlier,
}

/// Quartiles and outlier fences for a box map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxBreaks {
    /// Multiple of the interquartile range used for the fences.
    pub hinge: f64,
    /// `q1 - hinge * IQR`.
    pub lower_fence: f64,
    /// First quartile.
    pub q1: f64,
    /// Median.
    pub median: f64,
    /// Third quartile.
    pub q3: f64,
    /// `q3 + hinge * IQR`.
    pub upper_fence: f64,
}

impl BoxBreaks {
    /// Break points in ascending order.
    #[must_use]
    pub const fn as_array(&self) -> [f64; 5] {
        [self.lower_fence, self.q1, self.median, self.q3, self.upper_fence]
    }

    /// Bins a value. Lower bounds are inclusive from the first quartile up;
    /// values exactly on a fence are not outliers.
    #[must_use]
    pub fn classify(&self, value: f64) -> BoxCategory {
        if value < self.lower_fence {
            BoxCategory::LowerOutlier
        } else if value < self.q1 {
            BoxCategory::Below25
        } else if value <= self.median {
            BoxCategory::From25To50
        } else if value <= self.q3 {
            BoxCategory::From50To75
        } else if value <= self.upper_fence {
            BoxCategory::Above75
        } else {
            BoxCategory::UpperOutlier
        }
    }
}
