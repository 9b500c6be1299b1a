//! Property-based tests for k-d tree radius queries.
//!
//! Every query is checked against a brute-force scan of the same point set:
//! - completeness (nothing within the radius is missed),
//! - soundness (nothing outside the radius is reported),
//! - uniqueness (no index is reported twice).

use glam::Vec3;
use proptest::prelude::*;
use sph_kernel::KdTree;

fn brute_force(points: &[Vec3], center: Vec3, radius: f32) -> Vec<usize> {
    let r2 = radius * radius;
    (0..points.len())
        .filter(|&i| points[i].distance_squared(center) <= r2)
        .collect()
}

fn sorted(mut v: Vec<usize>) -> Vec<usize> {
    v.sort_unstable();
    v
}

/// Strategy for a point inside the cube [-2, 2]^3.
fn point() -> impl Strategy<Value = Vec3> {
    (-2.0f32..2.0, -2.0f32..2.0, -2.0f32..2.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

/// Strategy for a point set, with a few exact duplicates mixed in.
fn point_set() -> impl Strategy<Value = Vec<Vec3>> {
    (prop::collection::vec(point(), 0..300), 0usize..5).prop_map(|(mut pts, dups)| {
        for k in 0..dups.min(pts.len()) {
            let p = pts[k];
            pts.push(p);
        }
        pts
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: range query equals brute force for arbitrary centers and radii.
    #[test]
    fn matches_brute_force(points in point_set(), center in point(), radius in 0.0f32..3.0) {
        let tree = KdTree::build(&points);
        let found = tree.range_query(center, radius);
        let mut unique = found.clone();
        unique.sort_unstable();
        unique.dedup();
        prop_assert_eq!(unique.len(), found.len(), "duplicate indices reported");
        prop_assert_eq!(sorted(found), brute_force(&points, center, radius));
    }

    /// Property: radius zero centered on a stored point finds it (and its duplicates).
    #[test]
    fn zero_radius_finds_exact_point(points in point_set(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!points.is_empty());
        let i = pick.index(points.len());
        let tree = KdTree::build(&points);
        let found = sorted(tree.range_query(points[i], 0.0));
        prop_assert!(found.contains(&i));
        prop_assert_eq!(found, brute_force(&points, points[i], 0.0));
    }

    /// Property: a radius covering the whole cube returns every point.
    #[test]
    fn huge_radius_returns_everything(points in point_set(), center in point()) {
        let tree = KdTree::build(&points);
        let found = sorted(tree.range_query(center, 10.0));
        prop_assert_eq!(found, (0..points.len()).collect::<Vec<_>>());
    }

    /// Property: rebuilding from the same snapshot gives the same answers.
    #[test]
    fn rebuild_is_idempotent(points in point_set(), center in point(), radius in 0.0f32..1.5) {
        let a = KdTree::build(&points);
        let b = KdTree::build(&points);
        prop_assert_eq!(a.range_query(center, radius), b.range_query(center, radius));
        prop_assert_eq!(a.depth(), b.depth());
    }
}

#[test]
fn large_parallel_build_matches_brute_force() {
    // Deterministic pseudo-random cloud above the parallel build threshold.
    let n = 20_000;
    let points: Vec<Vec3> = (0..n)
        .map(|i| {
            let t = i as f32;
            Vec3::new(
                (t * 12.9898).sin().fract(),
                (t * 78.233).sin().fract(),
                (t * 37.719).sin().fract(),
            )
        })
        .collect();
    assert!(n > sph_kernel::kdtree::PARALLEL_BUILD_THRESHOLD);

    let tree = KdTree::build(&points);
    assert_eq!(tree.len(), n);
    for &i in &[0usize, 1, 777, 10_000, 19_999] {
        let center = points[i];
        assert_eq!(
            sorted(tree.range_query(center, 0.05)),
            brute_force(&points, center, 0.05),
            "center index {i}"
        );
    }
}
