//! Per-step neighbor table in compressed sparse row (CSR) layout.
//!
//! Uses offset + flat index arrays rather than `Vec<Vec<_>>` so the density
//! and force passes read one contiguous slice per particle, and the layout maps
//! directly to GPU buffers.

use rayon::prelude::*;

use crate::kdtree::KdTree;

/// Neighbors of every particle within the smoothing radius.
///
/// The neighbors of particle `i` are `indices[offsets[i]..offsets[i + 1]]`.
/// A particle is always listed as its own neighbor (distance zero), in the
/// order the k-d tree traversal reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborList {
    /// Start offset of each particle's run in `indices`. Length `N + 1`.
    /// `usize` because the total pair count can exceed `u32::MAX`.
    offsets: Vec<usize>,
    /// Concatenated neighbor indices.
    indices: Vec<u32>,
}

impl NeighborList {
    /// Create an empty list (zero particles).
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
        }
    }

    /// Rebuild the table from a tree built over the current positions.
    ///
    /// Each point in `tree` is queried with `radius`. Queries run in parallel;
    /// each particle's run is kept in traversal order, so the result does not
    /// depend on the number of worker threads.
    pub fn rebuild(&mut self, tree: &KdTree, radius: f32) {
        let points = tree.points();

        // --- 1. Query every particle independently ---
        let runs: Vec<Vec<u32>> = points
            .par_iter()
            .map(|&center| {
                let mut run = Vec::new();
                tree.for_each_in_radius(center, radius, |j| run.push(j as u32));
                run
            })
            .collect();

        // --- 2. Prefix-sum run lengths into offsets ---
        self.offsets.clear();
        self.offsets.reserve(runs.len() + 1);
        let mut running = 0usize;
        self.offsets.push(running);
        for run in &runs {
            running += run.len();
            self.offsets.push(running);
        }

        // --- 3. Concatenate runs ---
        self.indices.clear();
        self.indices.reserve(running);
        for run in runs {
            self.indices.extend(run);
        }
    }

    /// Neighbor indices of particle `i`, self included.
    #[inline]
    pub fn neighbors(&self, i: usize) -> &[u32] {
        &self.indices[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Number of particles covered by the table.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Return `true` if the table covers no particles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offsets array (length `len() + 1`).
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Flat neighbor index array.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of (i, j) pairs with `i != j`, counting both directions.
    pub fn pair_count(&self) -> usize {
        (0..self.len())
            .map(|i| self.neighbors(i).iter().filter(|&&j| j as usize != i).count())
            .sum()
    }

    /// Largest neighbor count of any particle, self excluded.
    pub fn max_neighbors(&self) -> usize {
        self.offsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .map_or(0, |m| m.saturating_sub(1))
    }
}

impl Default for NeighborList {
    fn default() -> Self {
        Self::new()
    }
}
