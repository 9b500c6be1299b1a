//! Scene setup: initial particle placement

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sph_kernel::{Bounds, Particle};

use crate::config::SpawnConfig;

/// Place `count` particles according to `spawn`, clamped into `domain`.
///
/// Particle ids are `0..count` in placement order.
pub fn spawn_particles(spawn: &SpawnConfig, count: usize, domain: &Bounds) -> Vec<Particle> {
    let mut particles = match *spawn {
        SpawnConfig::Lattice { spacing } => place_lattice(count, spacing),
        SpawnConfig::Sphere {
            center,
            radius,
            seed,
            velocity_jitter,
        } => place_sphere(count, Vec3::from_array(center), radius, seed, velocity_jitter),
    };

    let mut clamped = 0usize;
    for p in &mut particles {
        let inside = p.position.clamp(domain.min, domain.max);
        if inside != p.position {
            p.position = inside;
            p.predicted_position = inside;
            clamped += 1;
        }
    }
    if clamped > 0 {
        tracing::warn!("{} spawned particles were outside the domain and were clamped", clamped);
    }

    tracing::info!("Spawned {} fluid particles", particles.len());
    particles
}

/// Smallest n with n^3 >= count.
fn lattice_side(count: usize) -> usize {
    let mut n = 0;
    while n * n * n < count {
        n += 1;
    }
    n
}

/// Fill a centered n x n x n lattice in x-fastest order, stopping at `count`.
fn place_lattice(count: usize, spacing: f32) -> Vec<Particle> {
    let n = lattice_side(count);
    let offset = Vec3::splat((n as f32 - 1.0) * 0.5 * spacing);
    let mut particles = Vec::with_capacity(count);

    'fill: for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                if particles.len() == count {
                    break 'fill;
                }
                let p = Vec3::new(i as f32, j as f32, k as f32) * spacing - offset;
                particles.push(Particle::new(particles.len() as u32, p));
            }
        }
    }

    particles
}

/// Rejection-sample `count` points uniformly inside a sphere.
fn place_sphere(
    count: usize,
    center: Vec3,
    radius: f32,
    seed: u64,
    velocity_jitter: f32,
) -> Vec<Particle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut particles = Vec::with_capacity(count);

    while particles.len() < count {
        let p = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        if p.length_squared() > 1.0 {
            continue;
        }
        let velocity = if velocity_jitter > 0.0 {
            Vec3::new(
                rng.random_range(-velocity_jitter..=velocity_jitter),
                rng.random_range(-velocity_jitter..=velocity_jitter),
                rng.random_range(-velocity_jitter..=velocity_jitter),
            )
        } else {
            Vec3::ZERO
        };
        particles.push(Particle::with_velocity(
            particles.len() as u32,
            center + p * radius,
            velocity,
        ));
    }

    particles
}
