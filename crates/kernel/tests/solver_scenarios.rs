//! End-to-end solver scenarios.
//!
//! Runs the full step pipeline (neighbor search, density, forces, integration,
//! collision) on small scenes and checks:
//! 1. Free fall and wind match the semi-implicit Euler update exactly
//! 2. Densities stay positive and finite for arbitrary particle clouds
//! 3. Particles never tunnel through a triangle floor
//! 4. Results are bit-identical between runs
//! 5. Invalid parameters fail at construction

use glam::Vec3;
use proptest::prelude::*;
use sph_kernel::{
    Bounds, CollisionParams, KernelError, Particle, SimulationKernel, SolverParams, SphSolver,
    Triangle,
};

/// Two triangles covering the square [-0.8, 0.8]^2 in the y = 0 plane, normal +y.
fn floor() -> Vec<Triangle> {
    let a = Vec3::new(-0.8, 0.0, -0.8);
    let b = Vec3::new(-0.8, 0.0, 0.8);
    let c = Vec3::new(0.8, 0.0, 0.8);
    let d = Vec3::new(0.8, 0.0, -0.8);
    vec![Triangle::new(a, b, c), Triangle::new(a, c, d)]
}

fn falling_params() -> SolverParams {
    SolverParams {
        gravity: 9.8,
        gravity_direction: Vec3::new(0.0, -1.0, 0.0),
        wind_strength: 0.0,
        domain: Bounds::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0)),
        collision: CollisionParams {
            restitution: 0.3,
            friction: 0.1,
            particle_radius: 0.01,
        },
        ..SolverParams::default()
    }
}

#[test]
fn single_particle_free_fall() {
    let params = SolverParams {
        domain: Bounds::from_min_max(Vec3::splat(-10.0), Vec3::splat(10.0)),
        ..falling_params()
    };
    let mut solver = SphSolver::new(params, vec![Particle::new(0, Vec3::ZERO)], Vec::new()).unwrap();
    let dt = 0.016;

    solver.step(dt);
    let v = solver.particles()[0].velocity;
    assert!((v.y - (-0.1568)).abs() < 1.0e-5, "v.y after one step = {}", v.y);
    assert!(v.x.abs() < 1.0e-7 && v.z.abs() < 1.0e-7);

    let mut prev_y = solver.particles()[0].position.y;
    assert!(prev_y < 0.0);
    for _ in 0..9 {
        solver.step(dt);
        let y = solver.particles()[0].position.y;
        assert!(y < prev_y, "y must decrease monotonically: {y} >= {prev_y}");
        prev_y = y;
    }
    assert_eq!(solver.step_count(), 10);
    assert!((solver.sim_time() - 0.16).abs() < 1.0e-6);
}

#[test]
fn default_wind_accelerates_like_gravity() {
    // Default scene: 9.81 m/s^2 down and a unit wind along +x, both per unit mass.
    let mut solver =
        SphSolver::new(SolverParams::default(), vec![Particle::new(0, Vec3::ZERO)], Vec::new()).unwrap();
    let dt = 0.016;

    solver.step(dt);
    let v = solver.particles()[0].velocity;
    assert!((v.x - 1.0 * dt).abs() < 1.0e-5, "v.x after one step = {}", v.x);
    assert!((v.y - (-9.81 * dt)).abs() < 1.0e-5, "v.y after one step = {}", v.y);
    assert!(v.z.abs() < 1.0e-7);
}

#[test]
fn head_on_impact_does_not_tunnel() {
    // Fast enough to cross the floor in a single step.
    let particle = Particle::with_velocity(0, Vec3::new(0.1, 0.3, -0.2), Vec3::new(0.0, -40.0, 0.0));
    let mut solver = SphSolver::new(falling_params(), vec![particle], floor()).unwrap();

    let mut contacts = 0;
    for step in 0..200 {
        solver.step(0.01);
        let y = solver.particles()[0].position.y;
        assert!(y >= -1.0e-4, "step {step}: particle fell through the floor (y = {y})");
        contacts += solver.last_stats().triangle_contacts;
    }
    assert!(contacts > 0);
    let y = solver.particles()[0].position.y;
    assert!(y < 0.02, "particle should settle on the floor, y = {y}");
}

#[test]
fn identical_runs_are_bit_identical() {
    let particles: Vec<Particle> = (0..125)
        .map(|i| {
            let (x, y, z) = (i % 5, (i / 5) % 5, i / 25);
            Particle::new(i as u32, Vec3::new(x as f32, y as f32 + 2.0, z as f32) * 0.1 - 0.2)
        })
        .collect();
    let params = SolverParams {
        smoothing_radius: 0.15,
        ..falling_params()
    };
    let run = || {
        let mut solver = SphSolver::new(params.clone(), particles.clone(), floor()).unwrap();
        for _ in 0..20 {
            solver.step(0.005);
        }
        solver.particles().to_vec()
    };
    assert_eq!(run(), run());
}

#[test]
fn zero_smoothing_radius_is_rejected() {
    let params = SolverParams {
        smoothing_radius: 0.0,
        ..SolverParams::default()
    };
    match SphSolver::new(params, vec![Particle::new(0, Vec3::ZERO)], Vec::new()) {
        Err(KernelError::InvalidConfig { field, .. }) => assert_eq!(field, "smoothing_radius"),
        Ok(_) => panic!("zero smoothing radius must be rejected"),
    }
}

/// Strategy for a particle inside the default domain.
fn particle_at() -> impl Strategy<Value = Vec3> {
    (-0.9f32..0.9, -0.9f32..0.9, -0.9f32..0.9).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: density is strictly positive and finite after a step.
    #[test]
    fn density_is_positive(positions in prop::collection::vec(particle_at(), 1..80), h in 0.05f32..1.5) {
        let particles = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| Particle::new(i as u32, p))
            .collect();
        let params = SolverParams { smoothing_radius: h, ..SolverParams::default() };
        let mut solver = SphSolver::new(params, particles, Vec::new()).unwrap();
        solver.step(0.001);
        for p in solver.particles() {
            prop_assert!(p.density.is_finite() && p.density > 0.0, "density {}", p.density);
            prop_assert!(p.position.is_finite() && p.velocity.is_finite());
        }
        prop_assert_eq!(solver.particle_count(), positions.len());
    }

    /// Property: particles dropped onto the floor never end up behind it.
    #[test]
    fn floor_contains_falling_particles(
        x in -0.7f32..0.7,
        z in -0.7f32..0.7,
        height in 0.05f32..0.9,
        speed in 0.0f32..60.0,
    ) {
        let particle = Particle::with_velocity(0, Vec3::new(x, height, z), Vec3::new(0.0, -speed, 0.0));
        let mut solver = SphSolver::new(falling_params(), vec![particle], floor()).unwrap();
        for _ in 0..30 {
            solver.step(0.01);
            let y = solver.particles()[0].position.y;
            prop_assert!(y >= -1.0e-4, "y = {}", y);
        }
    }
}
