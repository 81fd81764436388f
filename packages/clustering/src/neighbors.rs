//! R-tree neighbourhood queries shared by both clustering methods.

use rstar::RTree;
use rstar::primitives::GeomWithData;

/// A stop coordinate tagged with its input position.
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Bulk-loaded R-tree over the input coordinates.
pub struct NeighborIndex {
    tree: RTree<IndexedPoint>,
}

impl NeighborIndex {
    pub fn build(points: &[[f64; 2]]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint::new(*p, i))
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Input positions of every point within `eps` (inclusive) of `point`,
    /// including the point itself, in ascending order.
    pub fn within(&self, point: [f64; 2], eps: f64) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_within_distance(point, eps * eps)
            .map(|p| p.data)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Distance to the `k`-th nearest point, counting `point` itself as
    /// the first. Falls back to the farthest point when fewer than `k`
    /// points exist.
    pub fn kth_nearest_distance(&self, point: [f64; 2], k: usize) -> f64 {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&point)
            .take(k.max(1))
            .last()
            .map_or(0.0, |(_, d2)| d2.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_is_inclusive_and_sorted() {
        let points = [[0.0, 0.0], [0.0, 1.0], [0.0, 2.0], [3.0, 0.0]];
        let index = NeighborIndex::build(&points);
        assert_eq!(index.within([0.0, 1.0], 1.0), vec![0, 1, 2]);
        assert_eq!(index.within([3.0, 0.0], 1.0), vec![3]);
    }

    #[test]
    fn kth_nearest_counts_self() {
        let points = [[0.0, 0.0], [1.0, 0.0], [3.0, 0.0]];
        let index = NeighborIndex::build(&points);
        assert!(index.kth_nearest_distance([0.0, 0.0], 1).abs() < 1e-12);
        assert!((index.kth_nearest_distance([0.0, 0.0], 2) - 1.0).abs() < 1e-12);
        assert!((index.kth_nearest_distance([0.0, 0.0], 10) - 3.0).abs() < 1e-12);
    }
}
