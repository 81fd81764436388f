//! Analysis configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) describes the stock Chicago analysis. Command-line flags override
//! individual values after loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use transit_density_analytics::breaks::DEFAULT_HINGE;
use transit_density_analytics::intensity::DEFAULT_ALPHA;
use transit_density_clustering_models::{DbscanParams, HdbscanParams};
use transit_density_geography::TractOptions;
use transit_density_geography::tracts::DEFAULT_REGION_ID_FIELD;
use transit_density_geography_models::Crs;
use transit_density_service::WeightMode;
use transit_density_spatial::JoinMode;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// TOML parse error.
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Path to the config file.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },
}

/// Full configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Input files and their coordinate systems.
    pub inputs: InputsConfig,
    /// Fixed-radius clustering parameters.
    pub dbscan: DbscanParams,
    /// Hierarchical clustering parameters.
    pub hdbscan: HdbscanParams,
    /// Intensity model settings.
    pub significance: SignificanceConfig,
    /// Box-map settings.
    pub breaks: BreaksConfig,
    /// Where results are written.
    pub output: OutputConfig,
}

/// `[inputs]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputsConfig {
    /// Stop table (CSV).
    pub stops: Option<PathBuf>,
    /// Tract boundaries (`GeoJSON`).
    pub tracts: Option<PathBuf>,
    /// GTFS `stop_times.txt`, used for scheduled-visit weights.
    pub stop_times: Option<PathBuf>,
    /// Tract property holding the region identifier.
    pub region_id_field: String,
    /// CRS shared by both inputs unless overridden below.
    pub crs: String,
    /// CRS of the stop table.
    pub stops_crs: Option<String>,
    /// CRS of the tract file, taking precedence over any it declares.
    pub tracts_crs: Option<String>,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            stops: None,
            tracts: None,
            stop_times: None,
            region_id_field: DEFAULT_REGION_ID_FIELD.to_string(),
            crs: Crs::WGS84.to_string(),
            stops_crs: None,
            tracts_crs: None,
        }
    }
}

impl InputsConfig {
    /// CRS to tag the stop layer with.
    #[must_use]
    pub fn stops_crs(&self) -> Crs {
        Crs::new(self.stops_crs.as_deref().unwrap_or(&self.crs))
    }

    /// Options for loading the tract file.
    #[must_use]
    pub fn tract_options(&self) -> TractOptions {
        TractOptions {
            region_id_field: self.region_id_field.clone(),
            crs: self.tracts_crs.as_deref().map(Crs::new),
            default_crs: Crs::new(&self.crs),
        }
    }
}

/// How the stop-to-tract join treats stops outside every tract.
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
pub enum JoinSetting {
    /// Drop them.
    Inner,
    /// Keep them with no tract.
    #[default]
    Left,
}

impl From<JoinSetting> for JoinMode {
    fn from(value: JoinSetting) -> Self {
        match value {
            JoinSetting::Inner => Self::Inner,
            JoinSetting::Left => Self::Left,
        }
    }
}

/// `[significance]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignificanceConfig {
    /// Classification threshold.
    pub alpha: f64,
    /// Join mode for aggregation.
    pub join: JoinSetting,
    /// What each stop contributes.
    pub weighting: WeightMode,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            join: JoinSetting::default(),
            weighting: WeightMode::default(),
        }
    }
}

/// `[breaks]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreaksConfig {
    /// Fence multiplier of the interquartile range.
    pub hinge: f64,
}

impl Default for BreaksConfig {
    fn default() -> Self {
        Self {
            hinge: DEFAULT_HINGE,
        }
    }
}

/// `[output]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory for generated files. Created if missing.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/generated"),
        }
    }
}

impl AnalysisConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or
    /// contains unknown keys. `source` names the input in the error.
    pub fn from_toml_str(toml_str: &str, source: &str) -> Result<Self, ConfigError> {
        toml::de::from_str(toml_str).map_err(|e| ConfigError::Parse {
            path: source.to_string(),
            source: e,
        })
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise
    /// see [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_toml_str(&text, &path.display().to_string())?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = AnalysisConfig::from_toml_str("", "inline").unwrap();

        assert_eq!(config, AnalysisConfig::default());
        assert!((config.dbscan.eps - 0.003).abs() < f64::EPSILON);
        assert_eq!(config.dbscan.min_samples, 10);
        assert_eq!(config.hdbscan.min_cluster_size, 8);
        assert!((config.significance.alpha - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.significance.join, JoinSetting::Left);
        assert_eq!(config.significance.weighting, WeightMode::Scheduled);
        assert!((config.breaks.hinge - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.inputs.region_id_field, "geoid10");
        assert_eq!(config.output.dir, PathBuf::from("data/generated"));
    }

    #[test]
    fn parses_full_config() {
        let toml_str = r#"
            [inputs]
            stops = "data/CTA_BusStops.csv"
            tracts = "data/tracts.geojson"
            stop_times = "data/gtfs/stop_times.txt"
            region_id_field = "GEOID"
            crs = "EPSG:26916"
            tracts_crs = "urn:ogc:def:crs:EPSG::3435"

            [dbscan]
            eps = 150.0
            min_samples = 5

            [hdbscan]
            min_cluster_size = 12
            min_samples = 4

            [significance]
            alpha = 0.05
            join = "inner"
            weighting = "count"

            [breaks]
            hinge = 3.0

            [output]
            dir = "out"
        "#;
        let config = AnalysisConfig::from_toml_str(toml_str, "inline").unwrap();

        assert_eq!(config.inputs.stops, Some(PathBuf::from("data/CTA_BusStops.csv")));
        assert_eq!(config.inputs.stops_crs().as_str(), "EPSG:26916");
        let tract_options = config.inputs.tract_options();
        assert_eq!(tract_options.crs, Some(Crs::new("EPSG:3435")));
        assert_eq!(tract_options.region_id_field, "GEOID");
        assert_eq!(config.dbscan.min_samples, 5);
        assert_eq!(config.hdbscan.effective_min_samples(), 4);
        assert_eq!(JoinMode::from(config.significance.join), JoinMode::Inner);
        assert_eq!(config.significance.weighting, WeightMode::Count);
        assert!((config.breaks.hinge - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.output.dir, PathBuf::from("out"));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = AnalysisConfig::from_toml_str("[dbscan]\neps = 0.01\n", "inline").unwrap();
        assert!((config.dbscan.eps - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.dbscan.min_samples, 10);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            AnalysisConfig::from_toml_str("[significance]\napha = 0.05\n", "inline"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            AnalysisConfig::load(Path::new("/nonexistent/analysis.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
