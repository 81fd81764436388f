//! Fixed-radius density clustering.
//!
//! A stop is a core point when at least `min_samples` stops (itself
//! included) lie within `eps`. Core points chained through each other's
//! neighbourhoods share a cluster; non-core stops inside a core point's
//! neighbourhood join that cluster as border points.
//!
//! Clusters are grown from core points in input order. A border point
//! reachable from more than one cluster keeps the label of whichever
//! cluster reached it first, so its label depends on input order.

use transit_density_clustering_models::{ClusterLabel, DbscanParams};

use crate::ClusterError;
use crate::neighbors::NeighborIndex;

/// Labels every point, in input order.
///
/// # Errors
///
/// Returns [`ClusterError::EmptyInput`] for no points,
/// [`ClusterError::NonFiniteCoordinate`] for NaN/infinite coordinates, and
/// [`ClusterError::InvalidParameter`] for a non-positive `eps` or a zero
/// `min_samples`.
pub fn dbscan(points: &[[f64; 2]], params: &DbscanParams) -> Result<Vec<ClusterLabel>, ClusterError> {
    validate_params(params)?;
    crate::validate_points(points)?;

    let index = NeighborIndex::build(points);
    let neighborhoods: Vec<Vec<usize>> = points
        .iter()
        .map(|p| index.within(*p, params.eps))
        .collect();
    let is_core: Vec<bool> = neighborhoods
        .iter()
        .map(|n| n.len() >= params.min_samples)
        .collect();

    log::debug!(
        "{} of {} points are core points (eps={}, min_samples={})",
        is_core.iter().filter(|c| **c).count(),
        points.len(),
        params.eps,
        params.min_samples,
    );

    let mut labels: Vec<Option<u32>> = vec![None; points.len()];
    let mut next_cluster = 0u32;
    let mut stack = Vec::new();

    for seed in 0..points.len() {
        if labels[seed].is_some() || !is_core[seed] {
            continue;
        }

        stack.push(seed);
        while let Some(i) = stack.pop() {
            if labels[i].is_some() {
                continue;
            }
            labels[i] = Some(next_cluster);

            if is_core[i] {
                stack.extend(neighborhoods[i].iter().filter(|&&j| labels[j].is_none()));
            }
        }

        next_cluster += 1;
    }

    Ok(labels
        .into_iter()
        .map(|l| l.map_or(ClusterLabel::Noise, ClusterLabel::Cluster))
        .collect())
}

fn validate_params(params: &DbscanParams) -> Result<(), ClusterError> {
    if !(params.eps.is_finite() && params.eps > 0.0) {
        return Err(ClusterError::InvalidParameter {
            name: "eps",
            value: params.eps.to_string(),
        });
    }
    if params.min_samples == 0 {
        return Err(ClusterError::InvalidParameter {
            name: "min_samples",
            value: params.min_samples.to_string(),
        });
    }
    Ok(())
}
