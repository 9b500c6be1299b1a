//! SPH Fluid Simulation Kernel
//!
//! This crate provides the compute core of a Smoothed Particle Hydrodynamics
//! (SPH) fluid simulation with collision against static triangle meshes. It
//! knows nothing about files, scenes, or rendering.
//!
//! # Modules
//! - [`geometry`] -- Axis-aligned bounds and collision triangles.
//! - [`kdtree`] -- Balanced k-d tree over particle positions, radius queries.
//! - [`neighbor`] -- CSR neighbor table built from the k-d tree every step.
//! - [`octree`] -- Octree over static triangles, plus a flattened GPU layout.
//! - [`sph`] -- Poly6 / spiky / viscosity kernels and the particle passes.
//! - [`eos`] -- Linear equation of state.
//! - [`collision`] -- Particle-triangle and domain wall response.
//! - [`solver`] -- [`SphSolver`], the per-step pipeline.

#![warn(missing_docs)]

pub mod collision;
pub mod eos;
pub mod error;
pub mod geometry;
pub mod kdtree;
pub mod neighbor;
pub mod octree;
pub mod particle;
pub mod solver;
pub mod sph;

pub use collision::CollisionParams;
pub use error::KernelError;
pub use geometry::{Bounds, Point3, Triangle};
pub use kdtree::KdTree;
pub use neighbor::NeighborList;
pub use octree::{FlatOctree, GpuOctreeNode, Octree, OctreeParams};
pub use particle::Particle;
pub use solver::{SolverParams, SphSolver, StepStats};

// ---------------------------------------------------------------------------
// SimulationKernel trait
// ---------------------------------------------------------------------------

/// Trait implemented by simulation back-ends.
///
/// A `SimulationKernel` owns particle data and advances the simulation through
/// distinct phases each time-step:
///
/// 1. Neighbor search
/// 2. Density and pressure
/// 3. Force computation (pressure + viscous + gravity + wind)
/// 4. Time integration (semi-implicit Euler)
/// 5. Collision resolution
pub trait SimulationKernel {
    /// Execute one simulation step of duration `dt` seconds.
    fn step(&mut self, dt: f32);

    /// Read back current particle state.
    fn particles(&self) -> &[Particle];

    /// Number of particles in the simulation.
    fn particle_count(&self) -> usize;

    /// Simulated time in seconds.
    fn sim_time(&self) -> f64;

    /// Number of completed steps.
    fn step_count(&self) -> u64;
}
