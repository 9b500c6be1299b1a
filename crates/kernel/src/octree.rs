//! Octree over static collision geometry.
//!
//! Objects are opaque `u32` handles (triangle indices in the solver) stored
//! together with their bounds. A leaf splits into eight equal octants once it
//! holds more than `max_objects_per_node` entries, unless it already sits at
//! `max_depth`. An object whose bounds straddle a split is stored in every
//! child it touches, so queries de-duplicate their results.
//!
//! [`Octree::flatten`] serializes the tree into parallel arrays in pre-order
//! for compute backends that cannot chase owned pointers.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::Bounds;

/// Handle of an object stored in the octree.
pub type ObjectHandle = u32;

/// Subdivision limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OctreeParams {
    /// Nodes at this depth never subdivide (the root is depth 0).
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// A leaf subdivides when it holds more entries than this.
    #[serde(default = "default_max_objects_per_node")]
    pub max_objects_per_node: usize,
}

fn default_max_depth() -> u32 {
    8
}

fn default_max_objects_per_node() -> usize {
    4
}

impl Default for OctreeParams {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_objects_per_node: default_max_objects_per_node(),
        }
    }
}

/// Relative padding applied to every culling box.
const CULL_PADDING: f32 = 4.0 * f32::EPSILON;

/// Culling box of a node described by `center` and `half_extent`.
///
/// Rebuilding `min`/`max` from a center and half extent is off by a few ulps,
/// so the box is padded until it always contains the exact node bounds. Both
/// [`Octree::query`] and [`FlatOctree::query_stackless`] cull with this box, so
/// a compute kernel reading [`GpuOctreeNode`]s must apply the same padding to
/// return the same handles.
pub fn culling_bounds(center: Vec3, half_extent: Vec3) -> Bounds {
    let half = half_extent.abs();
    let pad = (center.abs() + half) * CULL_PADDING;
    Bounds::from_center_half_extent(center, half + pad)
}

#[derive(Debug)]
struct OctreeNode {
    bounds: Bounds,
    /// Padded box used when culling queries. Insertion uses the exact `bounds`.
    cull: Bounds,
    depth: u32,
    /// Entries held by a leaf. Always empty on internal nodes.
    entries: Vec<(ObjectHandle, Bounds)>,
    children: Option<Box<[OctreeNode; 8]>>,
}

impl OctreeNode {
    fn new(bounds: Bounds, depth: u32) -> Self {
        Self {
            bounds,
            cull: culling_bounds(bounds.center(), bounds.half_extent()),
            depth,
            entries: Vec::new(),
            children: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    fn subdivide(&mut self) {
        let bounds = self.bounds;
        let depth = self.depth + 1;
        let children: [OctreeNode; 8] =
            std::array::from_fn(|i| OctreeNode::new(bounds.octant(i), depth));
        self.children = Some(Box::new(children));
    }

    fn insert(&mut self, handle: ObjectHandle, object_bounds: Bounds, params: &OctreeParams) -> bool {
        if !self.bounds.intersects(&object_bounds) {
            return false;
        }

        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                child.insert(handle, object_bounds, params);
            }
            return true;
        }

        self.entries.push((handle, object_bounds));
        if self.entries.len() > params.max_objects_per_node && self.depth < params.max_depth {
            self.subdivide();
            let entries = std::mem::take(&mut self.entries);
            if let Some(children) = self.children.as_mut() {
                for (h, b) in entries {
                    for child in children.iter_mut() {
                        child.insert(h, b, params);
                    }
                }
            }
        }
        true
    }

    fn collect(&self, query: &Bounds, out: &mut Vec<ObjectHandle>) {
        if !self.cull.intersects(query) {
            return;
        }
        match &self.children {
            None => out.extend(self.entries.iter().map(|(h, _)| *h)),
            Some(children) => {
                for child in children.iter() {
                    child.collect(query, out);
                }
            }
        }
    }

    fn gather(&self, flat: &mut FlatOctree) {
        let index = flat.centers.len();
        flat.centers.push(self.bounds.center());
        flat.half_extents.push(self.bounds.half_extent());
        flat.object_counts.push(self.entries.len() as u32);
        flat.object_indices.extend(self.entries.iter().map(|(h, _)| *h));
        flat.skips.push(0);
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.gather(flat);
            }
        }
        flat.skips[index] = flat.centers.len() as u32;
    }

    fn node_count(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map_or(0, |c| c.iter().map(OctreeNode::node_count).sum())
    }

    fn deepest(&self) -> u32 {
        self.children
            .as_ref()
            .map_or(self.depth, |c| c.iter().map(OctreeNode::deepest).max().unwrap_or(self.depth))
    }

    fn for_each_leaf<F: FnMut(&OctreeNode)>(&self, f: &mut F) {
        match &self.children {
            None => f(self),
            Some(children) => {
                for child in children.iter() {
                    child.for_each_leaf(f);
                }
            }
        }
    }
}

/// Bounds-intersection octree over static objects.
#[derive(Debug)]
pub struct Octree {
    root: OctreeNode,
    params: OctreeParams,
    len: usize,
}

impl Octree {
    /// Create an empty octree covering `root_bounds`.
    pub fn new(root_bounds: Bounds, params: OctreeParams) -> Self {
        Self {
            root: OctreeNode::new(root_bounds, 0),
            params,
            len: 0,
        }
    }

    /// Insert `handle` with its bounds.
    ///
    /// Returns `false` (and stores nothing) when `object_bounds` does not
    /// intersect the root bounds. That is a silent no-op, not an error: such
    /// objects can never be returned by a query.
    pub fn insert(&mut self, handle: ObjectHandle, object_bounds: Bounds) -> bool {
        let inserted = self.root.insert(handle, object_bounds, &self.params);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Sorted, de-duplicated handles stored in every leaf intersecting `query`.
    ///
    /// Leaves are culled with [`culling_bounds`], so a query touching a leaf
    /// face exactly still reaches it.
    pub fn query(&self, query: &Bounds) -> Vec<ObjectHandle> {
        let mut out = Vec::new();
        self.query_into(query, &mut out);
        out
    }

    /// Same as [`Octree::query`] but reuses `out` (cleared first).
    pub fn query_into(&self, query: &Bounds, out: &mut Vec<ObjectHandle>) {
        out.clear();
        self.root.collect(query, out);
        out.sort_unstable();
        out.dedup();
    }

    /// Root bounds the tree was created with.
    pub fn root_bounds(&self) -> Bounds {
        self.root.bounds
    }

    /// Subdivision limits.
    pub fn params(&self) -> OctreeParams {
        self.params
    }

    /// Number of accepted insertions.
    pub fn object_count(&self) -> usize {
        self.len
    }

    /// Return `true` if nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of nodes, internal and leaf.
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Depth of the deepest node (0 when the root never subdivided).
    pub fn max_depth_reached(&self) -> u32 {
        self.root.deepest()
    }

    /// Visit every leaf's bounds and handles. Used to check storage invariants.
    pub fn for_each_leaf<F>(&self, mut f: F)
    where
        F: FnMut(&Bounds, &[(ObjectHandle, Bounds)]),
    {
        self.root.for_each_leaf(&mut |node: &OctreeNode| {
            debug_assert!(node.is_leaf());
            f(&node.bounds, &node.entries)
        });
    }

    /// Serialize the tree in pre-order (node first, then children 0..8).
    pub fn flatten(&self) -> FlatOctree {
        let mut flat = FlatOctree::default();
        self.root.gather(&mut flat);
        flat
    }
}

/// Pre-order serialization of an [`Octree`].
///
/// All node arrays are parallel. Node `i` owns `object_counts[i]` handles of
/// `object_indices`, starting at the sum of all earlier counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatOctree {
    /// Node centers.
    pub centers: Vec<Vec3>,
    /// Node half extents.
    pub half_extents: Vec<Vec3>,
    /// Number of handles held by each node (zero for internal nodes).
    pub object_counts: Vec<u32>,
    /// Handles of all nodes, concatenated in node order.
    pub object_indices: Vec<u32>,
    /// Index of the first node after each node's subtree. A leaf has
    /// `skips[i] == i + 1`.
    pub skips: Vec<u32>,
}

/// One packed octree node as consumed by a compute shader.
///
/// Layout must match the WGSL/HLSL struct exactly (48 bytes, 16-byte aligned
/// vec3 slots). Traversals cull with [`culling_bounds`] of `center` and
/// `half_extent`, not with the unpadded box.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuOctreeNode {
    /// Node center.
    pub center: [f32; 3],
    /// First handle of this node in the object index buffer.
    pub object_offset: u32,
    /// Node half extent.
    pub half_extent: [f32; 3],
    /// Number of handles held by this node.
    pub object_count: u32,
    /// Pre-order index to jump to when this subtree is rejected.
    pub skip: u32,
    /// 1 for leaves, 0 for internal nodes.
    pub is_leaf: u32,
    /// Padding to a 16-byte multiple.
    pub _pad: [u32; 2],
}

impl FlatOctree {
    /// Number of serialized nodes.
    pub fn node_count(&self) -> usize {
        self.centers.len()
    }

    /// Start offset into `object_indices` for every node.
    pub fn object_offsets(&self) -> Vec<u32> {
        let mut running = 0u32;
        self.object_counts
            .iter()
            .map(|&count| {
                let start = running;
                running += count;
                start
            })
            .collect()
    }

    /// Pack the node arrays into GPU records.
    pub fn gpu_nodes(&self) -> Vec<GpuOctreeNode> {
        self.object_offsets()
            .into_iter()
            .enumerate()
            .map(|(i, object_offset)| GpuOctreeNode {
                center: self.centers[i].to_array(),
                object_offset,
                half_extent: self.half_extents[i].to_array(),
                object_count: self.object_counts[i],
                skip: self.skips[i],
                is_leaf: u32::from(self.skips[i] as usize == i + 1),
                _pad: [0; 2],
            })
            .collect()
    }

    /// Raw bytes of [`FlatOctree::gpu_nodes`], ready for a storage buffer upload.
    pub fn node_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.gpu_nodes()).to_vec()
    }

    /// Reference implementation of the stackless traversal a compute kernel
    /// runs over [`GpuOctreeNode`]s. Returns sorted, de-duplicated handles.
    pub fn query_stackless(&self, query: &Bounds) -> Vec<ObjectHandle> {
        let nodes = self.gpu_nodes();
        let mut out = Vec::new();
        let mut i = 0usize;
        while i < nodes.len() {
            let node = &nodes[i];
            let bounds =
                culling_bounds(Vec3::from_array(node.center), Vec3::from_array(node.half_extent));
            if !bounds.intersects(query) {
                i = node.skip as usize;
                continue;
            }
            if node.is_leaf == 1 {
                let start = node.object_offset as usize;
                let end = start + node.object_count as usize;
                out.extend_from_slice(&self.object_indices[start..end]);
            }
            i += 1;
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_root() -> Bounds {
        Bounds::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    fn small_box(center: Vec3) -> Bounds {
        Bounds::from_center_half_extent(center, Vec3::splat(0.01))
    }

    #[test]
    fn empty_tree_queries_empty() {
        let tree = Octree::new(unit_root(), OctreeParams::default());
        assert!(tree.is_empty());
        assert!(tree.query(&unit_root()).is_empty());
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn outside_root_is_silent_noop() {
        let mut tree = Octree::new(unit_root(), OctreeParams::default());
        let outside = small_box(Vec3::splat(5.0));
        assert!(!tree.insert(7, outside));
        assert!(tree.is_empty());
        assert!(tree.query(&outside).is_empty());
        assert!(tree.query(&unit_root().expanded(10.0)).is_empty());
    }

    #[test]
    fn leaf_does_not_split_at_threshold() {
        let params = OctreeParams {
            max_depth: 4,
            max_objects_per_node: 4,
        };
        let mut tree = Octree::new(unit_root(), params);
        for i in 0..4 {
            tree.insert(i, small_box(Vec3::splat(-0.5 + 0.1 * i as f32)));
        }
        assert_eq!(tree.node_count(), 1);
        tree.insert(4, small_box(Vec3::splat(0.5)));
        assert_eq!(tree.node_count(), 9);
        assert_eq!(tree.max_depth_reached(), 1);
    }

    #[test]
    fn subdivision_redistributes_every_entry() {
        let params = OctreeParams {
            max_depth: 3,
            max_objects_per_node: 1,
        };
        let mut tree = Octree::new(unit_root(), params);
        let a = small_box(Vec3::new(-0.5, -0.5, -0.5));
        let b = small_box(Vec3::new(0.5, 0.5, 0.5));
        tree.insert(0, a);
        tree.insert(1, b);
        assert_eq!(tree.query(&a), vec![0]);
        assert_eq!(tree.query(&b), vec![1]);
        tree.for_each_leaf(|bounds, entries| {
            for (_, object_bounds) in entries {
                assert!(bounds.intersects(object_bounds));
            }
        });
    }

    #[test]
    fn straddling_object_lands_in_every_touched_child() {
        let params = OctreeParams {
            max_depth: 1,
            max_objects_per_node: 1,
        };
        let mut tree = Octree::new(unit_root(), params);
        tree.insert(0, small_box(Vec3::splat(0.5)));
        // Spans the center, so it touches all eight octants.
        tree.insert(1, Bounds::from_center_half_extent(Vec3::ZERO, Vec3::splat(0.1)));
        let flat = tree.flatten();
        let holders = flat
            .object_indices
            .iter()
            .filter(|&&h| h == 1)
            .count();
        assert_eq!(holders, 8);
        // Queries report it once.
        assert_eq!(tree.query(&unit_root()), vec![0, 1]);
    }

    #[test]
    fn max_depth_stops_subdivision() {
        let params = OctreeParams {
            max_depth: 2,
            max_objects_per_node: 1,
        };
        let mut tree = Octree::new(unit_root(), params);
        let p = Vec3::new(0.3, 0.3, 0.3);
        for i in 0..20 {
            tree.insert(i, small_box(p));
        }
        assert_eq!(tree.max_depth_reached(), 2);
        assert_eq!(tree.query(&small_box(p)).len(), 20);
    }

    #[test]
    fn query_prunes_disjoint_regions() {
        let params = OctreeParams {
            max_depth: 4,
            max_objects_per_node: 1,
        };
        let mut tree = Octree::new(unit_root(), params);
        tree.insert(0, small_box(Vec3::splat(-0.75)));
        tree.insert(1, small_box(Vec3::splat(0.75)));
        let far_corner = small_box(Vec3::splat(0.75));
        assert_eq!(tree.query(&far_corner), vec![1]);
    }

    #[test]
    fn flatten_offsets_match_counts() {
        let params = OctreeParams {
            max_depth: 3,
            max_objects_per_node: 2,
        };
        let mut tree = Octree::new(unit_root(), params);
        for i in 0..12u32 {
            let t = i as f32 / 12.0;
            tree.insert(i, small_box(Vec3::new(-0.9 + 1.8 * t, 0.8 - 1.6 * t, 0.4 * t)));
        }
        let flat = tree.flatten();
        assert_eq!(flat.node_count(), tree.node_count());
        assert_eq!(flat.centers.len(), flat.half_extents.len());
        assert_eq!(flat.centers.len(), flat.object_counts.len());
        let total: u32 = flat.object_counts.iter().sum();
        assert_eq!(total as usize, flat.object_indices.len());

        // Root first, and the root's subtree covers everything.
        assert_eq!(flat.centers[0], Vec3::ZERO);
        assert_eq!(flat.half_extents[0], Vec3::ONE);
        assert_eq!(flat.skips[0] as usize, flat.node_count());

        // Internal nodes hold no objects.
        for i in 0..flat.node_count() {
            if flat.skips[i] as usize != i + 1 {
                assert_eq!(flat.object_counts[i], 0);
            }
        }
    }

    #[test]
    fn flatten_is_deterministic() {
        let build = || {
            let mut tree = Octree::new(
                unit_root(),
                OctreeParams {
                    max_depth: 3,
                    max_objects_per_node: 1,
                },
            );
            for i in 0..10u32 {
                let x = -0.9 + 0.18 * i as f32;
                tree.insert(i, small_box(Vec3::new(x, -x, x * 0.5)));
            }
            tree.flatten()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn gpu_nodes_are_48_bytes() {
        assert_eq!(std::mem::size_of::<GpuOctreeNode>(), 48);
        let tree = Octree::new(unit_root(), OctreeParams::default());
        let flat = tree.flatten();
        assert_eq!(flat.node_bytes().len(), 48);
        assert_eq!(flat.gpu_nodes()[0].is_leaf, 1);
    }

    #[test]
    fn culling_bounds_contain_node_bounds() {
        for k in 0..200 {
            let lo = Vec3::new(0.013, -3.7, 101.25);
            let b = Bounds::from_min_max(lo, lo + Vec3::splat(0.37 + 0.0071 * k as f32));
            let cull = culling_bounds(b.center(), b.half_extent());
            assert!(cull.min.cmple(b.min).all() && cull.max.cmpge(b.max).all(), "k = {k}");
            assert!((cull.size() - b.size()).abs().max_element() < 1.0e-3);
        }
    }

    #[test]
    fn stackless_traversal_matches_query() {
        let params = OctreeParams {
            max_depth: 4,
            max_objects_per_node: 2,
        };
        let mut tree = Octree::new(unit_root(), params);
        for i in 0..40u32 {
            let a = i as f32 * 0.618_034;
            let c = Vec3::new(a.sin() * 0.8, (a * 1.3).cos() * 0.8, (a * 0.7).sin() * 0.8);
            tree.insert(i, Bounds::from_center_half_extent(c, Vec3::splat(0.03 + 0.002 * i as f32)));
        }
        let flat = tree.flatten();
        for j in 0..25 {
            let b = j as f32 * 0.377;
            let c = Vec3::new(b.cos() * 0.7, b.sin() * 0.7, (b * 2.1).cos() * 0.7);
            let q = Bounds::from_center_half_extent(c, Vec3::splat(0.137));
            assert_eq!(flat.query_stackless(&q), tree.query(&q), "query {j}");
        }
    }
}
