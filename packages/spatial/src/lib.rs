#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial join of transit stops onto census tracts.
//!
//! Builds an R-tree over tract envelopes and answers closed point-in-polygon
//! ("intersects") queries, so a stop lying exactly on a shared tract
//! boundary is attributed to every tract that touches it. Unlike tract
//! attribution for incidents, nothing here picks a single winner.

use std::collections::BTreeSet;

use geo::{BoundingRect, Intersects, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;
use transit_density_geography_models::{Crs, RegionLayer, StopLayer};

/// Errors that can occur while building the index or joining.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpatialError {
    /// Stops and regions are in different coordinate systems.
    #[error("CRS mismatch: stops are in {points}, regions are in {regions}")]
    CrsMismatch {
        /// CRS of the stop layer.
        points: Crs,
        /// CRS of the region layer.
        regions: Crs,
    },

    /// A collection that must be non-empty was empty.
    #[error("Empty input: no {what}")]
    EmptyInput {
        /// Which collection was empty.
        what: &'static str,
    },

    /// A region is malformed (e.g. duplicate identifier).
    #[error("Invalid region {region_id}: {reason}")]
    InvalidRegion {
        /// Offending region identifier.
        region_id: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Whether stops that fall outside every region are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinMode {
    /// Drop unmatched stops.
    Inner,
    /// Keep unmatched stops with an empty region set.
    #[default]
    Left,
}

/// A region polygon stored in the R-tree with its input position.
struct BoundaryEntry<'a> {
    region_index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: &'a MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// The regions one stop was joined to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopAssignment {
    /// Index of the stop in the input layer.
    pub point_index: usize,
    /// Matched region identifiers, in region input order.
    pub region_ids: Vec<String>,
}

/// Output of [`SpatialIndex::join`], in stop input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResult {
    /// Join mode that produced this result.
    pub mode: JoinMode,
    /// Number of stops in the input layer.
    pub point_count: usize,
    /// One entry per retained stop.
    pub assignments: Vec<StopAssignment>,
}

impl JoinResult {
    /// Number of stops matched to at least one region.
    #[must_use]
    pub fn matched_count(&self) -> usize {
        self.assignments
            .iter()
            .filter(|a| !a.region_ids.is_empty())
            .count()
    }

    /// Number of input stops that matched no region, whether or not the
    /// join mode kept them.
    #[must_use]
    pub fn unmatched_count(&self) -> usize {
        self.point_count - self.matched_count()
    }

    /// Regions assigned to the given stop, if the stop was retained.
    #[must_use]
    pub fn regions_for(&self, point_index: usize) -> Option<&[String]> {
        self.assignments
            .binary_search_by_key(&point_index, |a| a.point_index)
            .ok()
            .map(|i| self.assignments[i].region_ids.as_slice())
    }
}

/// Pre-built R-tree over a region layer.
///
/// Borrows the layer's polygons, so it lives only as long as the layer.
pub struct SpatialIndex<'a> {
    crs: &'a Crs,
    region_ids: Vec<&'a str>,
    tree: RTree<BoundaryEntry<'a>>,
}

impl<'a> SpatialIndex<'a> {
    /// Builds the index over every region in the layer.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyInput`] if the layer has no regions and
    /// [`SpatialError::InvalidRegion`] if two regions share an identifier.
    pub fn build(regions: &'a RegionLayer) -> Result<Self, SpatialError> {
        if regions.is_empty() {
            return Err(SpatialError::EmptyInput { what: "regions" });
        }

        let mut seen = BTreeSet::new();
        let mut entries = Vec::with_capacity(regions.len());
        let mut region_ids = Vec::with_capacity(regions.len());

        for (region_index, region) in regions.features.iter().enumerate() {
            if !seen.insert(region.region_id.as_str()) {
                return Err(SpatialError::InvalidRegion {
                    region_id: region.region_id.clone(),
                    reason: "duplicate region identifier".to_string(),
                });
            }

            region_ids.push(region.region_id.as_str());

            let Some(envelope) = compute_envelope(&region.polygon) else {
                log::warn!("Region {} has an empty boundary", region.region_id);
                continue;
            };

            entries.push(BoundaryEntry {
                region_index,
                envelope,
                polygon: &region.polygon,
            });
        }

        log::debug!("Indexed {} regions in {}", entries.len(), regions.crs);

        Ok(Self {
            crs: &regions.crs,
            region_ids,
            tree: RTree::bulk_load(entries),
        })
    }

    /// CRS of the indexed regions.
    #[must_use]
    pub const fn crs(&self) -> &Crs {
        self.crs
    }

    /// Input positions of every region whose closed polygon contains the
    /// point, in region input order.
    #[must_use]
    pub fn lookup(&self, x: f64, y: f64) -> Vec<usize> {
        let point = geo::Point::new(x, y);
        let query_env = AABB::from_point([x, y]);

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .map(|entry| entry.region_index)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Joins every stop in the layer onto the indexed regions.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyInput`] if there are no stops and
    /// [`SpatialError::CrsMismatch`] if the stop layer's CRS differs from
    /// the regions'.
    pub fn join(&self, stops: &StopLayer, mode: JoinMode) -> Result<JoinResult, SpatialError> {
        if stops.is_empty() {
            return Err(SpatialError::EmptyInput { what: "stops" });
        }
        if stops.crs != *self.crs {
            return Err(SpatialError::CrsMismatch {
                points: stops.crs.clone(),
                regions: self.crs.clone(),
            });
        }

        let assignments: Vec<StopAssignment> = stops
            .features
            .iter()
            .enumerate()
            .filter_map(|(point_index, stop)| {
                let region_ids: Vec<String> = self
                    .lookup(stop.x, stop.y)
                    .into_iter()
                    .map(|i| self.region_ids[i].to_string())
                    .collect();

                if region_ids.is_empty() && mode == JoinMode::Inner {
                    None
                } else {
                    Some(StopAssignment {
                        point_index,
                        region_ids,
                    })
                }
            })
            .collect();

        let result = JoinResult {
            mode,
            point_count: stops.len(),
            assignments,
        };

        log::info!(
            "Joined {} stops onto {} regions: {} matched, {} unmatched",
            stops.len(),
            self.region_ids.len(),
            result.matched_count(),
            result.unmatched_count(),
        );

        Ok(result)
    }
}

/// Builds a throwaway index and joins in one call.
///
/// # Errors
///
/// See [`SpatialIndex::build`] and [`SpatialIndex::join`].
pub fn join(
    stops: &StopLayer,
    regions: &RegionLayer,
    mode: JoinMode,
) -> Result<JoinResult, SpatialError> {
    if stops.is_empty() {
        return Err(SpatialError::EmptyInput { what: "stops" });
    }
    SpatialIndex::build(regions)?.join(stops, mode)
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
