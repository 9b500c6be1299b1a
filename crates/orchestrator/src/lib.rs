//! Orchestration Layer
//!
//! This crate turns a JSON configuration into a running SPH simulation:
//! - Configuration parsing and validation
//! - STL file loading, vertex welding and the local-to-world transform
//! - Initial particle placement
//! - Simulation runner with lifecycle management and frame publishing

#![warn(missing_docs)]

pub mod config;
pub mod geometry;
pub mod mesh;
pub mod runner;
pub mod scene;

pub use config::{ConfigError, SimulationConfig};
pub use mesh::{IndexedMesh, MeshError};
pub use runner::{Frame, RunnerState, SimulationRunner};

use std::path::Path;

use glam::Vec3;
use sph_kernel::{SphSolver, Triangle};

/// Load the configured STL file and return world-space collision triangles
///
/// A relative `stl_file` is resolved against `base_dir`. No configured file
/// means no geometry.
pub fn load_geometry(
    config: &config::GeometryConfig,
    base_dir: &Path,
) -> Result<Vec<Triangle>, Box<dyn std::error::Error>> {
    let Some(stl_file) = &config.stl_file else {
        tracing::info!("No geometry configured");
        return Ok(Vec::new());
    };

    let geometry_path = base_dir.join(stl_file);
    tracing::info!("Loading STL geometry: {}", geometry_path.display());
    let (vertices, indices) = geometry::load_triangle_soup(&geometry_path)?;

    let mesh = mesh::weld(&vertices, &indices, config.weld_tolerance)?
        .transformed(config.scale, Vec3::from_array(config.translation));

    Ok(mesh.triangles())
}

/// Build a solver from a validated configuration
///
/// Spawns the particles, loads and welds the geometry, then constructs the
/// solver (which builds the collision octree).
pub fn build_solver(
    config: &SimulationConfig,
    base_dir: &Path,
) -> Result<SphSolver, Box<dyn std::error::Error>> {
    let params = config.to_solver_params();
    let particles = scene::spawn_particles(&config.spawn, config.particle_count, &params.domain);
    let triangles = load_geometry(&config.geometry, base_dir)?;

    let solver = SphSolver::new(params, particles, triangles)?;
    tracing::info!(
        "Solver built: {} particles, {} collision triangles",
        solver.particles().len(),
        solver.triangles().len()
    );
    Ok(solver)
}

/// Create a complete simulation from a configuration file
///
/// This function performs the full simulation setup pipeline:
/// 1. Load and validate the configuration
/// 2. Spawn the fluid particles
/// 3. Load, weld and transform the STL geometry
/// 4. Create the SPH solver
/// 5. Wrap in a SimulationRunner for lifecycle management
///
/// # Arguments
/// * `config_path` - Path to the JSON configuration file
///
/// # Returns
/// A `SimulationRunner` ready to be started, or an error if setup fails
///
/// # Example
/// ```no_run
/// use sph_orchestrator::create_simulation;
///
/// let runner = create_simulation("scenes/ramp.json")?;
/// runner.start();
/// // ... query status, pause, resume, etc.
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_simulation(
    config_path: impl AsRef<Path>,
) -> Result<SimulationRunner, Box<dyn std::error::Error>> {
    let config_path = config_path.as_ref();
    tracing::info!("Creating simulation from config: {}", config_path.display());

    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    // Geometry paths are relative to the config file directory
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let solver = build_solver(&config, config_dir)?;

    let runner = SimulationRunner::new(
        Box::new(solver),
        config.time_step,
        config.max_timesteps,
        config.max_time,
    );

    tracing::info!("Simulation created successfully");
    Ok(runner)
}
