//! Union-find that allocates a fresh label for every merge.
//!
//! Leaves are `0..n`; the `i`-th merge creates node `n + i`, which is how
//! the single-linkage dendrogram numbers its internal nodes.

pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    next_label: usize,
}

impl UnionFind {
    pub fn new(n_points: usize) -> Self {
        let capacity = (2 * n_points).saturating_sub(1).max(n_points);
        let mut size = vec![0; capacity];
        size[..n_points].fill(1);

        Self {
            parent: (0..capacity).collect(),
            size,
            next_label: n_points,
        }
    }

    pub fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }

        root
    }

    pub fn size_of(&self, root: usize) -> usize {
        self.size[root]
    }

    /// Merges two roots under a new label and returns it.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let label = self.next_label;
        self.parent[a] = label;
        self.parent[b] = label;
        self.size[label] = self.size[a] + self.size[b];
        self.next_label += 1;
        label
    }
}
