//! The SPH solver: owns the particles and the static collision scene and
//! advances them one step at a time.

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collision::{self, CollisionParams};
use crate::error::KernelError;
use crate::geometry::{Bounds, Triangle};
use crate::kdtree::KdTree;
use crate::neighbor::NeighborList;
use crate::octree::{Octree, OctreeParams};
use crate::particle::Particle;
use crate::sph::{self, FluidConstants};
use crate::SimulationKernel;

/// Progress is logged at debug level every this many steps.
const PROGRESS_LOG_INTERVAL: u64 = 100;

/// Physical and numerical parameters of a solver.
///
/// Defaults describe a small box of air-like fluid under standard gravity with
/// a unit wind along +x.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Smoothing radius h (kernel support).
    pub smoothing_radius: f32,
    /// Mass of every particle.
    pub particle_mass: f32,
    /// Rest density of the equation of state.
    pub rest_density: f32,
    /// Stiffness of the equation of state.
    pub gas_constant: f32,
    /// Dynamic viscosity.
    pub viscosity: f32,
    /// Gravity magnitude (m/s^2).
    pub gravity: f32,
    /// Gravity direction. Normalized on use; the zero vector disables gravity.
    pub gravity_direction: Vec3,
    /// Wind acceleration applied to every particle (scaled by mass like gravity).
    pub wind: Vec3,
    /// Scale applied to `wind`.
    pub wind_strength: f32,
    /// Simulation domain. Particles are clamped inside it.
    pub domain: Bounds,
    /// Collision response.
    pub collision: CollisionParams,
    /// Octree subdivision limits for the collision geometry.
    pub octree: OctreeParams,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            smoothing_radius: 1.2,
            particle_mass: 0.001225,
            rest_density: 1.225,
            gas_constant: 1.2,
            viscosity: 0.1,
            gravity: 9.81,
            gravity_direction: Vec3::NEG_Y,
            wind: Vec3::X,
            wind_strength: 1.0,
            domain: Bounds::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0)),
            collision: CollisionParams::default(),
            octree: OctreeParams::default(),
        }
    }
}

impl SolverParams {
    /// Check every parameter against its valid range.
    pub fn validate(&self) -> Result<(), KernelError> {
        let h = self.smoothing_radius;
        if !(h.is_finite() && h > 0.0) {
            return Err(KernelError::invalid(
                "smoothing_radius",
                format!("must be finite and > 0, got {h}"),
            ));
        }
        if !(self.particle_mass.is_finite() && self.particle_mass > 0.0) {
            return Err(KernelError::invalid(
                "particle_mass",
                format!("must be finite and > 0, got {}", self.particle_mass),
            ));
        }
        non_negative("rest_density", self.rest_density)?;
        non_negative("gas_constant", self.gas_constant)?;
        non_negative("viscosity", self.viscosity)?;
        if !self.gravity.is_finite() || !self.gravity_direction.is_finite() {
            return Err(KernelError::invalid("gravity", "must be finite"));
        }
        if !self.wind.is_finite() || !self.wind_strength.is_finite() {
            return Err(KernelError::invalid("wind", "must be finite"));
        }
        let d = &self.domain;
        if !(d.min.is_finite() && d.max.is_finite()) || (0..3).any(|a| !(d.min[a] < d.max[a])) {
            return Err(KernelError::invalid(
                "domain",
                format!("min {:?} must be below max {:?} on every axis", d.min, d.max),
            ));
        }
        unit_interval("collision.restitution", self.collision.restitution)?;
        unit_interval("collision.friction", self.collision.friction)?;
        non_negative("collision.particle_radius", self.collision.particle_radius)?;
        if self.octree.max_objects_per_node == 0 {
            return Err(KernelError::invalid(
                "octree.max_objects_per_node",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Body force applied to every particle: mass times gravity plus wind.
    pub fn external_force(&self) -> Vec3 {
        let acceleration =
            self.gravity_direction.normalize_or_zero() * self.gravity + self.wind * self.wind_strength;
        acceleration * self.particle_mass
    }

    fn fluid_constants(&self) -> FluidConstants {
        FluidConstants {
            smoothing_radius: self.smoothing_radius,
            particle_mass: self.particle_mass,
            rest_density: self.rest_density,
            gas_constant: self.gas_constant,
            viscosity: self.viscosity,
        }
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), KernelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KernelError::invalid(field, format!("must be finite and >= 0, got {value}")))
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), KernelError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(KernelError::invalid(field, format!("must be in [0, 1], got {value}")))
    }
}

/// Diagnostics from the most recent step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    /// Neighbor pairs (i, j) with `i != j`, both directions counted.
    pub neighbor_pairs: usize,
    /// Largest neighbor count of a single particle, self excluded.
    pub max_neighbors: usize,
    /// Smallest particle density.
    pub min_density: f32,
    /// Largest particle density.
    pub max_density: f32,
    /// Particle-triangle contacts resolved.
    pub triangle_contacts: u32,
    /// Domain wall contacts resolved.
    pub wall_contacts: u32,
}

/// SPH solver over a fixed particle set and static triangle scene.
///
/// Each [`SphSolver::step`] runs, in order:
///
/// 1. Neighbor search (fresh k-d tree over current positions)
/// 2. Density and pressure
/// 3. Forces (pressure + viscosity + gravity + wind)
/// 4. Semi-implicit Euler integration into the predicted buffers
/// 5. Triangle collisions, domain clamping, commit
#[derive(Debug)]
pub struct SphSolver {
    params: SolverParams,
    fluid: FluidConstants,
    external_force: Vec3,
    particles: Vec<Particle>,
    triangles: Vec<Triangle>,
    octree: Octree,
    neighbors: NeighborList,
    stats: StepStats,
    sim_time: f64,
    step_count: u64,
}

impl SphSolver {
    /// Create a solver.
    ///
    /// Degenerate triangles are dropped. Every remaining triangle is inserted
    /// into an octree covering `params.domain`; triangles entirely outside the
    /// domain are kept in [`SphSolver::triangles`] but never collide.
    pub fn new(
        params: SolverParams,
        particles: Vec<Particle>,
        triangles: Vec<Triangle>,
    ) -> Result<Self, KernelError> {
        params.validate()?;

        let total = triangles.len();
        let triangles: Vec<Triangle> = triangles.into_iter().filter(|t| !t.is_degenerate()).collect();
        if triangles.len() < total {
            warn!(
                dropped = total - triangles.len(),
                "Dropped degenerate collision triangles"
            );
        }

        let mut octree = Octree::new(params.domain, params.octree);
        let mut outside = 0usize;
        for (i, tri) in triangles.iter().enumerate() {
            if !octree.insert(i as u32, tri.bounds()) {
                debug!(triangle = i, "Triangle lies outside the domain; not stored");
                outside += 1;
            }
        }
        if outside > 0 {
            warn!(outside, "Collision triangles outside the domain will be ignored");
        }

        info!(
            particles = particles.len(),
            triangles = triangles.len(),
            octree_nodes = octree.node_count(),
            octree_depth = octree.max_depth_reached(),
            "SPH solver ready"
        );

        Ok(Self {
            fluid: params.fluid_constants(),
            external_force: params.external_force(),
            params,
            particles,
            triangles,
            octree,
            neighbors: NeighborList::new(),
            stats: StepStats::default(),
            sim_time: 0.0,
            step_count: 0,
        })
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// A non-positive or non-finite `dt` leaves the state unchanged.
    pub fn step(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            warn!(dt, "Skipping step with invalid time step");
            return;
        }

        // --- 1. Neighbor search ---
        let positions: Vec<Vec3> = self.particles.iter().map(|p| p.position).collect();
        let tree = KdTree::build(&positions);
        self.neighbors.rebuild(&tree, self.params.smoothing_radius);

        // --- 2. Density and pressure ---
        sph::compute_density_pressure(&mut self.particles, &self.neighbors, &self.fluid);

        // --- 3. Forces ---
        sph::compute_forces(
            &mut self.particles,
            &self.neighbors,
            &self.fluid,
            self.external_force,
        );

        // --- 4. Integration ---
        sph::integrate(&mut self.particles, self.params.particle_mass, dt);

        // --- 5. Collisions and commit ---
        let (triangle_contacts, wall_contacts) = self.resolve_collisions();

        let (min_density, max_density) = self
            .particles
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.density), hi.max(p.density))
            });
        self.stats = StepStats {
            neighbor_pairs: self.neighbors.pair_count(),
            max_neighbors: self.neighbors.max_neighbors(),
            min_density: if self.particles.is_empty() { 0.0 } else { min_density },
            max_density: if self.particles.is_empty() { 0.0 } else { max_density },
            triangle_contacts,
            wall_contacts,
        };

        self.sim_time += dt as f64;
        self.step_count += 1;

        if self.step_count % PROGRESS_LOG_INTERVAL == 0 {
            debug!(
                step = self.step_count,
                sim_time = self.sim_time,
                neighbor_pairs = self.stats.neighbor_pairs,
                min_density = self.stats.min_density,
                max_density = self.stats.max_density,
                triangle_contacts,
                wall_contacts,
                "SPH step"
            );
        }
    }

    /// Resolve triangle and wall contacts on the predicted state, then commit.
    fn resolve_collisions(&mut self) -> (u32, u32) {
        let octree = &self.octree;
        let triangles = &self.triangles;
        let domain = self.params.domain;
        let params = self.params.collision;

        self.particles
            .par_iter_mut()
            .map_init(Vec::new, |candidates, p| {
                let previous = p.position;
                let mut position = p.predicted_position;
                let mut velocity = p.predicted_velocity;

                let query = collision::swept_bounds(previous, position, params.particle_radius);
                octree.query_into(&query, candidates);
                let mut tri_hits = 0u32;
                for &handle in candidates.iter() {
                    let tri = &triangles[handle as usize];
                    if collision::resolve_triangle(tri, previous, &mut position, &mut velocity, &params) {
                        tri_hits += 1;
                    }
                }
                let wall_hits =
                    collision::clamp_to_domain(&mut position, &mut velocity, &domain, params.restitution);

                p.predicted_position = position;
                p.predicted_velocity = velocity;
                p.commit();
                (tri_hits, wall_hits)
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
    }

    /// Current particle state.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Solver parameters.
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Collision triangles (degenerate ones already removed).
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Octree over [`SphSolver::triangles`].
    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// Neighbor table from the most recent step.
    pub fn neighbor_list(&self) -> &NeighborList {
        &self.neighbors
    }

    /// Diagnostics from the most recent step.
    pub fn last_stats(&self) -> StepStats {
        self.stats
    }

    /// Simulated time (seconds) accumulated over all steps.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Number of steps taken. Skipped steps are not counted.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }
}

impl SimulationKernel for SphSolver {
    fn step(&mut self, dt: f32) {
        SphSolver::step(self, dt);
    }

    fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn particle_count(&self) -> usize {
        self.particles.len()
    }

    fn sim_time(&self) -> f64 {
        self.sim_time
    }

    fn step_count(&self) -> u64 {
        self.step_count
    }
}
