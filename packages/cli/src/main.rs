#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for transit stop density analysis.
//!
//! `cluster` finds natural groupings of stops, `assess` flags tracts with
//! significantly more or less service than a uniform intensity predicts,
//! and `run` does both.

mod config;
mod pipeline;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use transit_density_cli_utils::{IndicatifProgress, ProgressCallback};
use transit_density_clustering_models::ClusterMethod;
use transit_density_service::WeightMode;

use crate::config::{AnalysisConfig, JoinSetting};
use crate::pipeline::{ASSESS_STEPS, CLUSTER_STEPS, assess_tracts, cluster_stops};

#[derive(Parser)]
#[command(
    name = "transit_density",
    about = "Transit stop density clustering and tract service anomaly detection"
)]
struct Cli {
    /// Analysis configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    inputs: InputArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Stop table (CSV)
    #[arg(long, global = true)]
    stops: Option<PathBuf>,
    /// Tract boundaries (`GeoJSON`)
    #[arg(long, global = true)]
    tracts: Option<PathBuf>,
    /// GTFS `stop_times.txt` for scheduled-visit weights
    #[arg(long, global = true)]
    stop_times: Option<PathBuf>,
    /// CRS of both inputs (e.g. "EPSG:26916")
    #[arg(long, global = true)]
    crs: Option<String>,
    /// Output directory
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct ClusterArgs {
    /// Clustering method: `dbscan` or `hdbscan`
    #[arg(long, default_value = "dbscan", value_parser = parse_variant::<ClusterMethod>)]
    method: ClusterMethod,
    /// Neighbourhood radius for `dbscan`
    #[arg(long)]
    eps: Option<f64>,
    /// Minimum neighbourhood size for `dbscan` (or core distance `k` for
    /// `hdbscan`)
    #[arg(long)]
    min_samples: Option<usize>,
    /// Minimum cluster size for `hdbscan`
    #[arg(long)]
    min_cluster_size: Option<usize>,
}

#[derive(Args)]
struct AssessArgs {
    /// Significance threshold in (0, 1)
    #[arg(long)]
    alpha: Option<f64>,
    /// Join mode: `left` keeps stops outside every tract, `inner` drops them
    #[arg(long, value_parser = parse_variant::<JoinSetting>)]
    join: Option<JoinSetting>,
    /// Stop weighting: `scheduled` or `count`
    #[arg(long, value_parser = parse_variant::<WeightMode>)]
    weighting: Option<WeightMode>,
    /// Box-map fence multiplier
    #[arg(long)]
    hinge: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster stops and write their labels
    Cluster(ClusterArgs),
    /// Test tract service against a uniform intensity
    Assess(AssessArgs),
    /// Cluster and assess in one pass
    Run {
        #[command(flatten)]
        cluster: ClusterArgs,
        #[command(flatten)]
        assess: AssessArgs,
    },
}

/// Parses a snake_case enum value for clap.
fn parse_variant<T: FromStr>(value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("unrecognized value `{value}`"))
}

impl InputArgs {
    fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(stops) = &self.stops {
            config.inputs.stops = Some(stops.clone());
        }
        if let Some(tracts) = &self.tracts {
            config.inputs.tracts = Some(tracts.clone());
        }
        if let Some(stop_times) = &self.stop_times {
            config.inputs.stop_times = Some(stop_times.clone());
        }
        if let Some(crs) = &self.crs {
            config.inputs.crs.clone_from(crs);
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir.clone_from(dir);
        }
    }
}

impl ClusterArgs {
    fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(eps) = self.eps {
            config.dbscan.eps = eps;
        }
        if let Some(min_samples) = self.min_samples {
            match self.method {
                ClusterMethod::Dbscan => config.dbscan.min_samples = min_samples,
                ClusterMethod::Hdbscan => config.hdbscan.min_samples = Some(min_samples),
            }
        }
        if let Some(min_cluster_size) = self.min_cluster_size {
            config.hdbscan.min_cluster_size = min_cluster_size;
        }
    }
}

impl AssessArgs {
    fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(alpha) = self.alpha {
            config.significance.alpha = alpha;
        }
        if let Some(join) = self.join {
            config.significance.join = join;
        }
        if let Some(weighting) = self.weighting {
            config.significance.weighting = weighting;
        }
        if let Some(hinge) = self.hinge {
            config.breaks.hinge = hinge;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = transit_density_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    cli.inputs.apply(&mut config);

    let start = Instant::now();

    let (method, steps) = match &cli.command {
        Commands::Cluster(args) => {
            args.apply(&mut config);
            (Some(args.method), CLUSTER_STEPS)
        }
        Commands::Assess(args) => {
            args.apply(&mut config);
            (None, ASSESS_STEPS)
        }
        Commands::Run { cluster, assess } => {
            cluster.apply(&mut config);
            assess.apply(&mut config);
            (Some(cluster.method), CLUSTER_STEPS + ASSESS_STEPS)
        }
    };
    let run_assess = !matches!(cli.command, Commands::Cluster(_));

    let progress = IndicatifProgress::steps_bar(&multi, "Analysis", steps);

    if let Some(method) = method {
        let outcome = cluster_stops(&config, method, progress.as_ref())?;
        log::info!(
            "{method}: {} clusters, {} noise stops -> {}",
            outcome.summary.cluster_count,
            outcome.summary.noise_count,
            outcome.path.display(),
        );
    }

    if run_assess {
        match assess_tracts(&config, progress.as_ref())? {
            Some(outcome) => {
                let report = &outcome.report;
                log::info!(
                    "Intensity {:.4}/km²: {} more than expected, {} less than expected, {} non-significant",
                    report.intensity,
                    report.more_than_expected,
                    report.less_than_expected,
                    report.non_significant,
                );
                if let Some(breaks) = &outcome.breaks {
                    log::info!(
                        "Box map breaks (hinge {}): {:?}",
                        breaks.hinge,
                        breaks.as_array()
                    );
                }
            }
            None => log::warn!("Tract assessment skipped"),
        }
    }

    progress.finish(format!("Done in {:.1}s", start.elapsed().as_secs_f64()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_config() {
        let cli = Cli::try_parse_from([
            "transit_density",
            "run",
            "--method",
            "hdbscan",
            "--min-cluster-size",
            "12",
            "--min-samples",
            "3",
            "--alpha",
            "0.05",
            "--join",
            "inner",
            "--weighting",
            "count",
            "--stops",
            "stops.csv",
        ])
        .unwrap();

        let mut config = AnalysisConfig::default();
        cli.inputs.apply(&mut config);
        let Commands::Run { cluster, assess } = &cli.command else {
            panic!("expected run");
        };
        cluster.apply(&mut config);
        assess.apply(&mut config);

        assert_eq!(cluster.method, ClusterMethod::Hdbscan);
        assert_eq!(config.hdbscan.min_cluster_size, 12);
        assert_eq!(config.hdbscan.min_samples, Some(3));
        assert_eq!(config.dbscan.min_samples, 10);
        assert!((config.significance.alpha - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.significance.join, JoinSetting::Inner);
        assert_eq!(config.significance.weighting, WeightMode::Count);
        assert_eq!(config.inputs.stops, Some(PathBuf::from("stops.csv")));
    }

    #[test]
    fn rejects_unknown_method() {
        assert!(Cli::try_parse_from(["transit_density", "cluster", "--method", "kmeans"]).is_err());
    }
}
