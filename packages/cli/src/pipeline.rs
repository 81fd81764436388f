//! Load, analyse, and write steps behind each subcommand.
//!
//! Every step reports to a [`ProgressCallback`] so the binary can show a
//! step bar while tests pass a null one.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use transit_density_analytics::AnalyticsError;
use transit_density_analytics::breaks::box_map;
use transit_density_analytics_models::{BoxBreaks, BoxCategory, IntensityReport, Significance};
use transit_density_cli_utils::ProgressCallback;
use transit_density_clustering::{ClusterError, ClusterParams, cluster};
use transit_density_clustering_models::{ClusterLabel, ClusterMethod, ClusterSummary};
use transit_density_geography::{GeographyError, load_stops, load_tracts};
use transit_density_geography_models::{RegionLayer, StopLayer};
use transit_density_service::schedule::{attach_scheduled_visits, count_scheduled_visits_from_path};
use transit_density_service::{ServiceError, WeightMode, aggregate, observed_inputs, stop_weights};
use transit_density_spatial::{SpatialError, SpatialIndex};

use crate::config::AnalysisConfig;

/// Steps reported by [`cluster_stops`].
pub const CLUSTER_STEPS: u64 = 3;

/// Steps reported by [`assess_tracts`].
pub const ASSESS_STEPS: u64 = 5;

/// Errors that can occur while running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required input path was not configured.
    #[error("Missing input: set {key} in the config or pass it on the command line")]
    MissingInput {
        /// Config key that must be set.
        key: &'static str,
    },

    /// Loading failed.
    #[error(transparent)]
    Geography(#[from] GeographyError),

    /// Clustering failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Aggregation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Intensity modelling failed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// The join failed for a reason other than empty input.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// CSV output error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Output path.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// JSON output error.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// Output path.
        path: String,
        /// Underlying serialization error.
        source: serde_json::Error,
    },

    /// I/O error writing output.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// One row of the stop cluster CSV.
#[derive(Debug, Serialize)]
struct StopClusterRow<'a> {
    stop_id: &'a str,
    x: f64,
    y: f64,
    label: i64,
}

/// One row of the tract service CSV.
#[derive(Debug, Serialize)]
struct TractRow<'a> {
    region_id: &'a str,
    area_km2: f64,
    observed_count: u64,
    expected_count: f64,
    p_value: f64,
    significance: Significance,
    legend: &'static str,
    box_category: Option<BoxCategory>,
}

/// What [`cluster_stops`] produced.
#[derive(Debug)]
pub struct ClusterOutcome {
    /// Cluster and noise counts.
    pub summary: ClusterSummary,
    /// Labelled stop CSV.
    pub path: PathBuf,
}

/// What [`assess_tracts`] produced.
#[derive(Debug)]
pub struct AssessOutcome {
    /// Fitted model and per-tract classification.
    pub report: IntensityReport,
    /// Box-map breaks over the tracts with any service, or `None` when no
    /// tract has service.
    pub breaks: Option<BoxBreaks>,
    /// Per-tract CSV.
    pub csv_path: PathBuf,
    /// Report JSON.
    pub json_path: PathBuf,
}

/// Loads the stop table and, for scheduled weighting with a `stop_times`
/// file, attaches visit counts.
///
/// # Errors
///
/// Returns [`PipelineError::MissingInput`] if no stop table is configured,
/// or any load error.
pub fn load_stop_layer(config: &AnalysisConfig, weighted: bool) -> Result<StopLayer, PipelineError> {
    let path = config
        .inputs
        .stops
        .as_deref()
        .ok_or(PipelineError::MissingInput { key: "inputs.stops" })?;
    let stops = load_stops(path, config.inputs.stops_crs())?;

    match (&config.inputs.stop_times, weighted) {
        (Some(stop_times), true) => {
            let visits = count_scheduled_visits_from_path(stop_times)?;
            Ok(attach_scheduled_visits(stops, &visits))
        }
        _ => Ok(stops),
    }
}

fn load_region_layer(config: &AnalysisConfig) -> Result<RegionLayer, PipelineError> {
    let path = config
        .inputs
        .tracts
        .as_deref()
        .ok_or(PipelineError::MissingInput { key: "inputs.tracts" })?;
    Ok(load_tracts(path, &config.inputs.tract_options())?)
}

/// Clusters the stop table and writes `stop_clusters_<method>.csv`.
///
/// # Errors
///
/// Returns [`PipelineError`] if loading, clustering, or writing fails.
pub fn cluster_stops(
    config: &AnalysisConfig,
    method: ClusterMethod,
    progress: &dyn ProgressCallback,
) -> Result<ClusterOutcome, PipelineError> {
    progress.set_message("Loading stops".to_string());
    let stops = load_stop_layer(config, false)?;
    progress.inc(1);

    progress.set_message(format!("Clustering ({method})"));
    let params = match method {
        ClusterMethod::Dbscan => ClusterParams::Dbscan(config.dbscan),
        ClusterMethod::Hdbscan => ClusterParams::Hdbscan(config.hdbscan),
    };
    let points: Vec<[f64; 2]> = stops.features.iter().map(|s| s.coord()).collect();
    let clustering = cluster(&points, &params)?;
    progress.inc(1);

    progress.set_message("Writing stop clusters".to_string());
    let path = output_path(config, &format!("stop_clusters_{method}.csv"))?;
    write_stop_clusters(&path, &stops, &clustering.labels)?;
    progress.inc(1);

    log::info!("Wrote {}", path.display());

    Ok(ClusterOutcome {
        summary: clustering.summary,
        path,
    })
}

/// Joins stops onto tracts, fits the intensity model, and writes
/// `tract_service.csv` and `intensity_report.json`.
///
/// Returns `Ok(None)` when either layer is empty: the join has nothing to
/// aggregate, so the step is skipped with a warning.
///
/// # Errors
///
/// Returns [`PipelineError`] if loading, joining, modelling, or writing
/// fails.
pub fn assess_tracts(
    config: &AnalysisConfig,
    progress: &dyn ProgressCallback,
) -> Result<Option<AssessOutcome>, PipelineError> {
    let weighting = config.significance.weighting;

    progress.set_message("Loading stops".to_string());
    let stops = load_stop_layer(config, weighting == WeightMode::Scheduled)?;
    progress.inc(1);

    progress.set_message("Loading tracts".to_string());
    let tracts = load_region_layer(config)?;
    progress.inc(1);

    progress.set_message("Joining stops to tracts".to_string());
    let join = match SpatialIndex::build(&tracts).and_then(|index| {
        log::debug!("Indexed {} tracts in {}", tracts.features.len(), index.crs());
        index.join(&stops, config.significance.join.into())
    }) {
        Ok(join) => join,
        Err(SpatialError::EmptyInput { what }) => {
            log::warn!("No {what} to join; skipping tract aggregation");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let counts = aggregate(&join, &stop_weights(&stops, weighting))?;
    let inputs = observed_inputs(&tracts, &counts);
    progress.inc(1);

    progress.set_message("Assessing intensity".to_string());
    let report = transit_density_analytics::assess(&inputs, config.significance.alpha)?;
    let (breaks, categories) = served_box_map(&report, config.breaks.hinge)?;
    progress.inc(1);

    progress.set_message("Writing tract results".to_string());
    let csv_path = output_path(config, "tract_service.csv")?;
    write_tract_rows(&csv_path, &report, &categories)?;
    let json_path = output_path(config, "intensity_report.json")?;
    write_json(&json_path, &report)?;
    progress.inc(1);

    log::info!("Wrote {} and {}", csv_path.display(), json_path.display());

    Ok(Some(AssessOutcome {
        report,
        breaks,
        csv_path,
        json_path,
    }))
}

/// Box map over the tracts with a positive observed count. Tracts without
/// service get no category.
fn served_box_map(
    report: &IntensityReport,
    hinge: f64,
) -> Result<(Option<BoxBreaks>, Vec<Option<BoxCategory>>), PipelineError> {
    #[allow(clippy::cast_precision_loss)]
    let served: Vec<f64> = report
        .regions
        .iter()
        .filter(|r| r.observed_count > 0)
        .map(|r| r.observed_count as f64)
        .collect();
    if served.is_empty() {
        log::warn!("No tract has any service; skipping box map");
        return Ok((None, vec![None; report.regions.len()]));
    }

    let (breaks, served_categories) = box_map(&served, hinge)?;
    let mut served_categories = served_categories.into_iter();
    let categories = report
        .regions
        .iter()
        .map(|r| {
            if r.observed_count > 0 {
                served_categories.next()
            } else {
                None
            }
        })
        .collect();

    Ok((Some(breaks), categories))
}

fn output_path(config: &AnalysisConfig, file_name: &str) -> Result<PathBuf, PipelineError> {
    let dir = &config.output.dir;
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;
    Ok(dir.join(file_name))
}

fn write_stop_clusters(
    path: &Path,
    stops: &StopLayer,
    labels: &[ClusterLabel],
) -> Result<(), PipelineError> {
    let csv_err = |source| PipelineError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for (stop, label) in stops.features.iter().zip(labels) {
        writer
            .serialize(StopClusterRow {
                stop_id: &stop.stop_id,
                x: stop.x,
                y: stop.y,
                label: label.as_i64(),
            })
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|e| PipelineError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_tract_rows(
    path: &Path,
    report: &IntensityReport,
    categories: &[Option<BoxCategory>],
) -> Result<(), PipelineError> {
    let csv_err = |source| PipelineError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for (region, &box_category) in report.regions.iter().zip(categories) {
        writer
            .serialize(TractRow {
                region_id: &region.region_id,
                area_km2: region.area_km2,
                observed_count: region.observed_count,
                expected_count: region.expected_count,
                p_value: region.p_value,
                significance: region.significance,
                legend: region.significance.label(),
                box_category,
            })
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|e| PipelineError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_json(path: &Path, report: &IntensityReport) -> Result<(), PipelineError> {
    let file = std::fs::File::create(path).map_err(|e| PipelineError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), report).map_err(|e| {
        PipelineError::Json {
            path: path.display().to_string(),
            source: e,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use transit_density_cli_utils::NullProgress;

    use super::*;

    const TRACTS: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "EPSG:26916"}},
        "features": [
            {"type": "Feature", "properties": {"geoid10": "west"},
             "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1000, 0], [1000, 1000], [0, 1000], [0, 0]]]}},
            {"type": "Feature", "properties": {"geoid10": "east"},
             "geometry": {"type": "Polygon", "coordinates": [[[1000, 0], [2000, 0], [2000, 1000], [1000, 1000], [1000, 0]]]}}
        ]
    }"#;

    /// Forty stops packed into the west tract, one in the east tract, and
    /// one outside both.
    fn stops_csv() -> String {
        let mut csv = String::from("stop_id,x,y\n");
        for i in 0..40_u32 {
            let x = 100.0 + f64::from(i % 8) * 10.0;
            let y = 100.0 + f64::from(i / 8) * 10.0;
            writeln!(csv, "w{i},{x},{y}").unwrap();
        }
        csv.push_str("e0,1500,500\n");
        csv.push_str("out,5000,5000\n");
        csv
    }

    fn config_in(dir: &Path) -> AnalysisConfig {
        let stops = dir.join("stops.csv");
        let tracts = dir.join("tracts.geojson");
        std::fs::write(&stops, stops_csv()).unwrap();
        std::fs::write(&tracts, TRACTS).unwrap();

        let mut config = AnalysisConfig::default();
        config.inputs.stops = Some(stops);
        config.inputs.tracts = Some(tracts);
        config.inputs.crs = "EPSG:26916".to_string();
        config.output.dir = dir.join("out");
        config.dbscan.eps = 15.0;
        config.dbscan.min_samples = 4;
        config.significance.alpha = 0.05;
        config
    }

    #[test]
    fn cluster_writes_labelled_stops() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let outcome = cluster_stops(&config, ClusterMethod::Dbscan, &NullProgress).unwrap();

        assert_eq!(outcome.summary.cluster_count, 1);
        assert_eq!(outcome.summary.noise_count, 2);

        let written = std::fs::read_to_string(&outcome.path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("stop_id,x,y,label"));
        assert!(written.contains("out,5000.0,5000.0,-1"));
        assert_eq!(written.lines().count(), 43);
    }

    #[test]
    fn assess_writes_report_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let outcome = assess_tracts(&config, &NullProgress).unwrap().unwrap();
        let report = &outcome.report;

        assert_eq!(report.total_observed, 41);
        assert!((report.total_area_km2 - 2.0).abs() < 1e-9);
        assert_eq!(report.regions[0].significance, Significance::MoreThanExpected);
        assert_eq!(report.regions[1].significance, Significance::LessThanExpected);

        let csv = std::fs::read_to_string(&outcome.csv_path).unwrap();
        assert!(csv.starts_with(
            "region_id,area_km2,observed_count,expected_count,p_value,significance,legend,box_category"
        ));
        assert!(csv.contains("more_than_expected,More than expected,"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&outcome.json_path).unwrap()).unwrap();
        assert_eq!(json["totalObserved"], 41);
        assert_eq!(json["regions"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn box_map_covers_only_served_tracts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let north = r#"{"type": "Feature", "properties": {"geoid10": "north"},
             "geometry": {"type": "Polygon", "coordinates": [[[0, 1000], [1000, 1000], [1000, 2000], [0, 2000], [0, 1000]]]}}"#;
        let tracts = TRACTS.replace("\n        ]\n    }", &format!(",\n{north}\n        ]\n    }}"));
        std::fs::write(config.inputs.tracts.as_ref().unwrap(), tracts).unwrap();

        let outcome = assess_tracts(&config, &NullProgress).unwrap().unwrap();

        assert_eq!(outcome.report.regions.len(), 3);
        assert_eq!(outcome.report.regions[2].observed_count, 0);
        // Median of the served counts [1, 40]; the empty tract would pull it
        // down to 1.
        let breaks = outcome.breaks.unwrap();
        assert!((breaks.median - 20.5).abs() < 1e-9);

        let csv = std::fs::read_to_string(&outcome.csv_path).unwrap();
        let north_row = csv.lines().find(|l| l.starts_with("north,")).unwrap();
        assert!(north_row.ends_with(",less_than_expected,Less than expected,"));
    }

    #[test]
    fn scheduled_weights_come_from_stop_times() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        let stop_times = dir.path().join("stop_times.txt");
        std::fs::write(&stop_times, "trip_id,stop_id\nt1,e0\nt2,e0\nt3,w0\n").unwrap();
        config.inputs.stop_times = Some(stop_times);

        let outcome = assess_tracts(&config, &NullProgress).unwrap().unwrap();

        assert_eq!(outcome.report.regions[0].observed_count, 1);
        assert_eq!(outcome.report.regions[1].observed_count, 2);
    }

    #[test]
    fn empty_stop_table_skips_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(config.inputs.stops.as_ref().unwrap(), "stop_id,x,y\n").unwrap();

        assert!(assess_tracts(&config, &NullProgress).unwrap().is_none());
    }

    #[test]
    fn missing_inputs_are_reported() {
        let config = AnalysisConfig::default();
        assert!(matches!(
            cluster_stops(&config, ClusterMethod::Hdbscan, &NullProgress),
            Err(PipelineError::MissingInput { key: "inputs.stops" })
        ));
    }

    #[test]
    fn crs_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.inputs.stops_crs = Some("EPSG:4326".to_string());

        assert!(matches!(
            assess_tracts(&config, &NullProgress),
            Err(PipelineError::Spatial(SpatialError::CrsMismatch { .. }))
        ));
    }
}
