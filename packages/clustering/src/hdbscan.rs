//! Hierarchical density clustering.
//!
//! Builds the minimum spanning tree of the mutual reachability graph,
//! turns it into a single-linkage dendrogram, condenses the dendrogram so
//! that only splits into two groups of at least `min_cluster_size` count as
//! new clusters, and keeps the clusters with the greatest excess of mass
//! (stability). Stops that fall out of the hierarchy above every selected
//! cluster are noise.
//!
//! The root of the condensed tree is never selected, so a dataset that is
//! one undivided blob comes back entirely as noise.

use std::collections::VecDeque;

use transit_density_clustering_models::{ClusterLabel, HdbscanParams};

use crate::ClusterError;
use crate::neighbors::NeighborIndex;
use crate::union_find::UnionFind;

/// Floor applied to linkage distances before inverting them into density
/// levels. Coincident stops link at distance zero.
const MIN_LINKAGE_DISTANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
struct MstEdge {
    from: usize,
    to: usize,
    distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct LinkageNode {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// One parent -> child relation in the condensed tree. Children below
/// `n_points` are stops; the rest are clusters.
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

struct CondensedTree {
    n_points: usize,
    /// Number of cluster nodes, root included. Cluster ids run
    /// `n_points..n_points + cluster_count`.
    cluster_count: usize,
    edges: Vec<CondensedEdge>,
}

impl CondensedTree {
    const fn root(&self) -> usize {
        self.n_points
    }

    fn slot(&self, cluster: usize) -> usize {
        cluster - self.n_points
    }

    /// Edge indices grouped by parent cluster slot.
    fn children(&self) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); self.cluster_count];
        for (i, edge) in self.edges.iter().enumerate() {
            children[self.slot(edge.parent)].push(i);
        }
        children
    }
}

/// Labels every point, in input order.
///
/// # Errors
///
/// Returns [`ClusterError::EmptyInput`] for no points,
/// [`ClusterError::NonFiniteCoordinate`] for NaN/infinite coordinates, and
/// [`ClusterError::InvalidParameter`] when `min_cluster_size < 2` or
/// `min_samples` is zero.
pub fn hdbscan(
    points: &[[f64; 2]],
    params: &HdbscanParams,
) -> Result<Vec<ClusterLabel>, ClusterError> {
    validate_params(params)?;
    crate::validate_points(points)?;

    if points.len() == 1 {
        return Ok(vec![ClusterLabel::Noise]);
    }

    let core = core_distances(points, params.effective_min_samples());
    let mst = mutual_reachability_mst(points, &core);
    let linkage = single_linkage(points.len(), &mst);
    let condensed = condense(points.len(), &linkage, params.min_cluster_size);
    let selected = select_clusters(&condensed);

    log::debug!(
        "Condensed tree has {} clusters below the root, {} selected",
        condensed.cluster_count - 1,
        selected.len(),
    );

    Ok(label_points(&condensed, &selected))
}

fn validate_params(params: &HdbscanParams) -> Result<(), ClusterError> {
    if params.min_cluster_size < 2 {
        return Err(ClusterError::InvalidParameter {
            name: "min_cluster_size",
            value: params.min_cluster_size.to_string(),
        });
    }
    if params.min_samples == Some(0) {
        return Err(ClusterError::InvalidParameter {
            name: "min_samples",
            value: "0".to_string(),
        });
    }
    Ok(())
}

fn core_distances(points: &[[f64; 2]], min_samples: usize) -> Vec<f64> {
    let index = NeighborIndex::build(points);
    points
        .iter()
        .map(|p| index.kth_nearest_distance(*p, min_samples))
        .collect()
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

/// Prim's algorithm over the dense mutual reachability graph. Returns the
/// `n - 1` edges sorted by distance; equal distances keep discovery order.
fn mutual_reachability_mst(points: &[[f64; 2]], core: &[f64]) -> Vec<MstEdge> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut best_from = vec![0; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[current] = true;

    for _ in 1..n {
        let mut next: Option<usize> = None;

        for j in 0..n {
            if in_tree[j] {
                continue;
            }

            let reach = distance(points[current], points[j])
                .max(core[current])
                .max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                best_from[j] = current;
            }

            if next.is_none_or(|k| best[j] < best[k]) {
                next = Some(j);
            }
        }

        let Some(j) = next else {
            break;
        };

        edges.push(MstEdge {
            from: best_from[j],
            to: j,
            distance: best[j],
        });
        in_tree[j] = true;
        current = j;
    }

    edges.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    edges
}

/// Dendrogram node `n + i` is `linkage[i]`.
fn single_linkage(n_points: usize, mst: &[MstEdge]) -> Vec<LinkageNode> {
    let mut uf = UnionFind::new(n_points);
    let mut linkage = Vec::with_capacity(mst.len());

    for edge in mst {
        let left = uf.find(edge.from);
        let right = uf.find(edge.to);
        let size = uf.size_of(left) + uf.size_of(right);
        uf.union(left, right);

        linkage.push(LinkageNode {
            left,
            right,
            distance: edge.distance,
            size,
        });
    }

    linkage
}

fn linkage_size(n_points: usize, linkage: &[LinkageNode], node: usize) -> usize {
    if node < n_points {
        1
    } else {
        linkage[node - n_points].size
    }
}

/// Breadth-first walk of the dendrogram below `root`, `root` included.
fn linkage_descendants(n_points: usize, linkage: &[LinkageNode], root: usize) -> Vec<usize> {
    let mut queue = VecDeque::from([root]);
    let mut nodes = Vec::new();

    while let Some(node) = queue.pop_front() {
        nodes.push(node);
        if node >= n_points {
            let link = &linkage[node - n_points];
            queue.push_back(link.left);
            queue.push_back(link.right);
        }
    }

    nodes
}

fn condense(n_points: usize, linkage: &[LinkageNode], min_cluster_size: usize) -> CondensedTree {
    let root = n_points + linkage.len() - 1;
    let mut relabel = vec![0; root + 1];
    relabel[root] = n_points;
    let mut next_label = n_points + 1;
    let mut ignore = vec![false; root + 1];
    let mut edges = Vec::new();

    let mut fall_out = |node: usize, parent: usize, lambda: f64, ignore: &mut [bool]| {
        for sub in linkage_descendants(n_points, linkage, node) {
            if sub < n_points {
                edges.push(CondensedEdge {
                    parent,
                    child: sub,
                    lambda,
                    size: 1,
                });
            }
            ignore[sub] = true;
        }
    };

    let mut splits = Vec::new();

    for node in linkage_descendants(n_points, linkage, root) {
        if ignore[node] || node < n_points {
            continue;
        }

        let link = linkage[node - n_points];
        let lambda = 1.0 / link.distance.max(MIN_LINKAGE_DISTANCE);
        let parent = relabel[node];
        let left_size = linkage_size(n_points, linkage, link.left);
        let right_size = linkage_size(n_points, linkage, link.right);

        match (left_size >= min_cluster_size, right_size >= min_cluster_size) {
            (true, true) => {
                for (child, size) in [(link.left, left_size), (link.right, right_size)] {
                    relabel[child] = next_label;
                    next_label += 1;
                    splits.push(CondensedEdge {
                        parent,
                        child: relabel[child],
                        lambda,
                        size,
                    });
                }
            }
            (false, false) => {
                fall_out(link.left, parent, lambda, &mut ignore);
                fall_out(link.right, parent, lambda, &mut ignore);
            }
            (false, true) => {
                relabel[link.right] = parent;
                fall_out(link.left, parent, lambda, &mut ignore);
            }
            (true, false) => {
                relabel[link.left] = parent;
                fall_out(link.right, parent, lambda, &mut ignore);
            }
        }
    }

    edges.extend(splits);

    CondensedTree {
        n_points,
        cluster_count: next_label - n_points,
        edges,
    }
}

/// Excess-of-mass selection. Returns selected cluster ids in ascending
/// order.
fn select_clusters(tree: &CondensedTree) -> Vec<usize> {
    let mut birth = vec![0.0; tree.cluster_count];
    for edge in &tree.edges {
        if edge.child >= tree.n_points {
            birth[tree.slot(edge.child)] = edge.lambda;
        }
    }

    let mut stability = vec![0.0; tree.cluster_count];
    for edge in &tree.edges {
        let slot = tree.slot(edge.parent);
        #[allow(clippy::cast_precision_loss)]
        let mass = edge.size as f64;
        stability[slot] += (edge.lambda - birth[slot]) * mass;
    }

    let children = tree.children();
    let child_clusters = |slot: usize| {
        children[slot]
            .iter()
            .map(|&i| tree.edges[i].child)
            .filter(|&c| c >= tree.n_points)
            .map(|c| tree.slot(c))
            .collect::<Vec<_>>()
    };

    let mut is_selected = vec![true; tree.cluster_count];
    is_selected[tree.slot(tree.root())] = false;

    // Children always carry larger ids than their parents.
    for slot in (1..tree.cluster_count).rev() {
        let subtree: f64 = child_clusters(slot).iter().map(|&c| stability[c]).sum();

        if subtree > stability[slot] {
            is_selected[slot] = false;
            stability[slot] = subtree;
        } else {
            let mut queue: VecDeque<usize> = child_clusters(slot).into();
            while let Some(descendant) = queue.pop_front() {
                is_selected[descendant] = false;
                queue.extend(child_clusters(descendant));
            }
        }
    }

    is_selected
        .iter()
        .enumerate()
        .filter(|(_, selected)| **selected)
        .map(|(slot, _)| tree.n_points + slot)
        .collect()
}

/// Every stop below a selected cluster takes that cluster's label; the
/// rest are noise.
fn label_points(tree: &CondensedTree, selected: &[usize]) -> Vec<ClusterLabel> {
    let children = tree.children();
    let mut labels = vec![ClusterLabel::Noise; tree.n_points];

    for (label, &cluster) in (0u32..).zip(selected) {
        let mut queue = VecDeque::from([cluster]);
        while let Some(node) = queue.pop_front() {
            for &i in &children[tree.slot(node)] {
                let child = tree.edges[i].child;
                if child < tree.n_points {
                    labels[child] = ClusterLabel::Cluster(label);
                } else {
                    queue.push_back(child);
                }
            }
        }
    }

    labels
}
