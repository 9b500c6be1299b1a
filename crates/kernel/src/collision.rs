//! Particle collision response against static triangles and the domain box.
//!
//! Both responses act on the predicted state of a single particle. The side
//! of a triangle a particle belongs to is decided by its committed position
//! (where it came from), so a fast particle that tunnels through a surface in
//! one step is still pushed back to the side it started on.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds, Triangle};

/// Collision response parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionParams {
    /// Fraction of the normal velocity kept (and reversed) on impact, in `[0, 1]`.
    #[serde(default = "default_restitution")]
    pub restitution: f32,
    /// Fraction of the tangential velocity removed on contact, in `[0, 1]`.
    #[serde(default = "default_friction")]
    pub friction: f32,
    /// Distance kept between a particle center and any surface.
    #[serde(default = "default_particle_radius")]
    pub particle_radius: f32,
}

fn default_restitution() -> f32 {
    0.2
}

fn default_friction() -> f32 {
    0.1
}

fn default_particle_radius() -> f32 {
    0.01
}

impl Default for CollisionParams {
    fn default() -> Self {
        Self {
            restitution: default_restitution(),
            friction: default_friction(),
            particle_radius: default_particle_radius(),
        }
    }
}

/// Bounds swept by a particle moving from `from` to `to`, grown by `radius`.
///
/// Used as the octree query for candidate triangles.
pub fn swept_bounds(from: Vec3, to: Vec3, radius: f32) -> Bounds {
    Bounds::from_min_max(from, to).expanded(radius)
}

/// Resolve contact between one particle and one triangle.
///
/// `previous` is the committed position at the start of the step; `position`
/// and `velocity` are the predicted values and are corrected in place.
///
/// A contact exists when the predicted position is within `particle_radius` of
/// the triangle, or when the segment `previous -> position` crosses the
/// triangle's plane at a point within `particle_radius` of the triangle. On
/// contact the position is moved along the normal until it sits
/// `particle_radius` in front of the plane, on the side `previous` lies on;
/// the approaching normal velocity is reflected and scaled by `restitution`,
/// and the tangential velocity is scaled by `1 - friction`.
///
/// Returns `true` if a contact was resolved.
pub fn resolve_triangle(
    triangle: &Triangle,
    previous: Vec3,
    position: &mut Vec3,
    velocity: &mut Vec3,
    params: &CollisionParams,
) -> bool {
    let normal = triangle.normal();
    if normal == Vec3::ZERO {
        return false;
    }

    // Orient the normal towards the side the particle came from.
    let d_prev = triangle.plane_distance(previous);
    let side = if d_prev > 0.0 {
        1.0
    } else if d_prev < 0.0 {
        -1.0
    } else if velocity.dot(normal) > 0.0 {
        -1.0
    } else {
        1.0
    };
    let n = normal * side;
    let dist_prev = d_prev * side;
    let dist_now = triangle.plane_distance(*position) * side;

    let radius = params.particle_radius;
    if dist_now >= radius {
        return false;
    }

    let radius_sq = radius * radius;
    let near_surface = triangle.closest_point(*position).distance_squared(*position) <= radius_sq;
    let crossed = dist_now < 0.0 && {
        let t = dist_prev / (dist_prev - dist_now);
        let hit = previous + (*position - previous) * t;
        triangle.closest_point(hit).distance_squared(hit) <= radius_sq
    };
    if !near_surface && !crossed {
        return false;
    }

    *position += n * (radius - dist_now);

    let vn = velocity.dot(n);
    let normal_part = n * vn;
    let tangential = *velocity - normal_part;
    let normal_part = if vn < 0.0 {
        -normal_part * params.restitution
    } else {
        normal_part
    };
    *velocity = normal_part + tangential * (1.0 - params.friction);
    true
}

/// Clamp a particle into `domain`, reflecting the velocity component that
/// points out of each wall it touched.
///
/// Returns the number of walls hit.
pub fn clamp_to_domain(
    position: &mut Vec3,
    velocity: &mut Vec3,
    domain: &Bounds,
    restitution: f32,
) -> u32 {
    let mut hits = 0;
    for axis in 0..3 {
        if position[axis] < domain.min[axis] {
            position[axis] = domain.min[axis];
            if velocity[axis] < 0.0 {
                velocity[axis] = -restitution * velocity[axis];
            }
            hits += 1;
        } else if position[axis] > domain.max[axis] {
            position[axis] = domain.max[axis];
            if velocity[axis] > 0.0 {
                velocity[axis] = -restitution * velocity[axis];
            }
            hits += 1;
        }
    }
    hits
}
