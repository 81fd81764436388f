#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Areal anomaly detection for tract-level transit service.
//!
//! Service is modelled as a homogeneous Poisson process: one intensity for
//! the whole study area, fitted as total observed service over total area.
//! Each tract's expected count is that intensity times its area, and the
//! Poisson probability of its observed count flags tracts with
//! significantly more or less service than the model predicts.
//!
//! [`breaks`] bins raw counts into box-map classes for display.

pub mod breaks;
pub mod intensity;
pub mod poisson;

use thiserror::Error;

pub use breaks::box_breaks;
pub use intensity::assess;

/// Errors that can occur during analytics operations.
#[derive(Debug, Error, PartialEq)]
pub enum AnalyticsError {
    /// Nothing to analyse.
    #[error("Empty input: no {what}")]
    EmptyInput {
        /// What was missing.
        what: &'static str,
    },

    /// A region cannot be modelled.
    #[error("Invalid region {region_id}: area {area_km2} km² must be finite and positive")]
    InvalidRegion {
        /// Region identifier.
        region_id: String,
        /// Rejected area.
        area_km2: f64,
    },

    /// A parameter is out of range.
    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },
}
