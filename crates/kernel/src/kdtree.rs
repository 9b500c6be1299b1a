//! Balanced k-d tree over a snapshot of 3D points.
//!
//! The tree is built by recursive median split: at depth `d` the split axis is
//! `d % 3`, the median of the current sub-range (along that axis) becomes the
//! node, and the two remaining halves become its children. Only an auxiliary
//! index array is reordered, so query results are indices into the caller's
//! original point order.
//!
//! The tree is immutable once built. Particles move every step, so the solver
//! simply builds a fresh tree and drops the previous one.

use glam::Vec3;

/// Sub-ranges at least this large build their two halves on separate rayon
/// workers. Smaller ranges recurse on the current thread.
pub const PARALLEL_BUILD_THRESHOLD: usize = 4096;

#[derive(Debug)]
struct KdNode {
    /// Index into the point snapshot (the caller's original order).
    point_index: usize,
    depth: u32,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

impl KdNode {
    #[inline]
    fn axis(&self) -> usize {
        (self.depth % 3) as usize
    }
}

/// Static k-d tree supporting radius range queries.
#[derive(Debug, Default)]
pub struct KdTree {
    points: Vec<Vec3>,
    root: Option<Box<KdNode>>,
}

impl KdTree {
    /// Build a tree over `points`.
    ///
    /// The points are copied into the tree; `points` itself is never reordered.
    /// An empty slice produces an empty tree.
    pub fn build(points: &[Vec3]) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let root = build_node(points, &mut order, 0);
        Self {
            points: points.to_vec(),
            root,
        }
    }

    /// Number of points in the tree.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Return `true` if the tree holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The point snapshot the tree was built from, in the caller's order.
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Number of levels from the root to the deepest node (0 for an empty tree).
    pub fn depth(&self) -> usize {
        fn depth_of(node: &Option<Box<KdNode>>) -> usize {
            node.as_ref()
                .map_or(0, |n| 1 + depth_of(&n.left).max(depth_of(&n.right)))
        }
        depth_of(&self.root)
    }

    /// Indices of all points with `distance(point, center) <= radius`.
    ///
    /// Order follows the tree traversal; every matching index appears once.
    pub fn range_query(&self, center: Vec3, radius: f32) -> Vec<usize> {
        let mut result = Vec::new();
        self.for_each_in_radius(center, radius, |i| result.push(i));
        result
    }

    /// Invoke `f` with the index of every point within `radius` of `center`.
    ///
    /// A negative or NaN radius matches nothing. Distances are compared squared.
    pub fn for_each_in_radius<F>(&self, center: Vec3, radius: f32, mut f: F)
    where
        F: FnMut(usize),
    {
        if !(radius >= 0.0) {
            return;
        }
        if let Some(root) = &self.root {
            self.visit(root, center, radius * radius, &mut f);
        }
    }

    fn visit<F>(&self, node: &KdNode, center: Vec3, radius_sq: f32, f: &mut F)
    where
        F: FnMut(usize),
    {
        let point = self.points[node.point_index];
        if point.distance_squared(center) <= radius_sq {
            f(node.point_index);
        }

        let axis = node.axis();
        let diff = center[axis] - point[axis];
        let (near, far) = if diff <= 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(near) = near {
            self.visit(near, center, radius_sq, f);
        }
        // Written so that a NaN `diff` still descends: never prune on NaN.
        if !(diff * diff > radius_sq) {
            if let Some(far) = far {
                self.visit(far, center, radius_sq, f);
            }
        }
    }
}

fn build_node(points: &[Vec3], order: &mut [usize], depth: u32) -> Option<Box<KdNode>> {
    if order.is_empty() {
        return None;
    }

    let axis = (depth % 3) as usize;
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| points[a][axis].total_cmp(&points[b][axis]));
    let point_index = order[mid];

    let (lower, rest) = order.split_at_mut(mid);
    let upper = &mut rest[1..];

    let (left, right) = if lower.len() + upper.len() >= PARALLEL_BUILD_THRESHOLD {
        rayon::join(
            || build_node(points, lower, depth + 1),
            || build_node(points, upper, depth + 1),
        )
    } else {
        (
            build_node(points, lower, depth + 1),
            build_node(points, upper, depth + 1),
        )
    };

    Some(Box::new(KdNode {
        point_index,
        depth,
        left,
        right,
    }))
}
