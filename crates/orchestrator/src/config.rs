//! Configuration parsing and validation for SPH simulations

use std::fs;
use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use sph_kernel::{Bounds, CollisionParams, OctreeParams, SolverParams};
use thiserror::Error;

/// Errors raised while loading or validating a [`SimulationConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for this schema.
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is outside its valid range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main simulation configuration
///
/// Every field has a default, so `{}` is a valid config describing 1000 air
/// particles in a 2 m box under gravity and a unit wind along +x.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    pub name: String,
    /// Number of fluid particles to spawn
    pub particle_count: usize,
    /// Rest density of the equation of state (kg/m^3)
    pub rest_density: f32,
    /// Stiffness of the equation of state
    pub stiffness: f32,
    /// Dynamic viscosity
    pub viscosity: f32,
    /// Mass of every particle (kg)
    pub particle_mass: f32,
    /// Kernel support radius (m)
    pub smoothing_radius: f32,
    /// Gravity magnitude (m/s^2)
    pub gravity: f32,
    /// Gravity direction; normalized by the solver
    pub gravity_direction: [f32; 3],
    /// Wind acceleration vector
    pub wind: [f32; 3],
    /// Scale applied to `wind`
    pub wind_strength: f32,
    /// Simulation domain bounds
    pub domain: DomainBounds,
    /// Initial particle placement
    pub spawn: SpawnConfig,
    /// Static collision geometry
    pub geometry: GeometryConfig,
    /// Particle/triangle collision response
    pub collision: CollisionParams,
    /// Octree subdivision limits
    pub octree: OctreeParams,
    /// How the runner picks each step's dt
    pub time_step: TimeStepConfig,
    /// Stop after this many timesteps
    pub max_timesteps: Option<u64>,
    /// Stop after this much simulated time (seconds)
    pub max_time: Option<f64>,
}

/// Domain bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainBounds {
    /// Minimum corner [x, y, z]
    pub min: [f32; 3],
    /// Maximum corner [x, y, z]
    pub max: [f32; 3],
}

/// Initial particle placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpawnConfig {
    /// Cubic lattice centered at the origin
    Lattice {
        /// Distance between neighboring lattice sites (m)
        #[serde(default = "default_lattice_spacing")]
        spacing: f32,
    },
    /// Uniform random fill of a sphere
    Sphere {
        /// Sphere center [x, y, z]
        #[serde(default)]
        center: [f32; 3],
        /// Sphere radius (m)
        radius: f32,
        /// RNG seed; equal seeds give equal particle sets
        #[serde(default)]
        seed: u64,
        /// Each initial velocity component is drawn from [-jitter, jitter]
        #[serde(default)]
        velocity_jitter: f32,
    },
}

/// Static triangle geometry loaded from an STL file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Path to STL geometry file, relative to the config file's directory
    pub stl_file: Option<String>,
    /// Vertices closer than this are merged (m)
    pub weld_tolerance: f32,
    /// Uniform scale applied before translation
    pub scale: f32,
    /// Translation applied after scaling [x, y, z]
    pub translation: [f32; 3],
}

/// Timestep policy for the runner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimeStepConfig {
    /// The same dt every step
    Fixed {
        /// Step size (seconds)
        dt: f32,
    },
    /// dt follows elapsed wall-clock time, capped at `max_dt`
    WallClock {
        /// Largest step the runner will take (seconds)
        max_dt: f32,
    },
}

// Default values
fn default_lattice_spacing() -> f32 {
    0.1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let solver = SolverParams::default();
        Self {
            name: "sph".to_string(),
            particle_count: 1000,
            rest_density: solver.rest_density,
            stiffness: solver.gas_constant,
            viscosity: solver.viscosity,
            particle_mass: solver.particle_mass,
            smoothing_radius: solver.smoothing_radius,
            gravity: solver.gravity,
            gravity_direction: solver.gravity_direction.to_array(),
            wind: solver.wind.to_array(),
            wind_strength: solver.wind_strength,
            domain: DomainBounds::default(),
            spawn: SpawnConfig::default(),
            geometry: GeometryConfig::default(),
            collision: CollisionParams::default(),
            octree: OctreeParams::default(),
            time_step: TimeStepConfig::default(),
            max_timesteps: None,
            max_time: None,
        }
    }
}

impl Default for DomainBounds {
    fn default() -> Self {
        Self {
            min: [-1.0; 3],
            max: [1.0; 3],
        }
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        SpawnConfig::Lattice {
            spacing: default_lattice_spacing(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            stl_file: None,
            weld_tolerance: 0.01,
            scale: 1.0,
            translation: [0.0; 3],
        }
    }
}

impl Default for TimeStepConfig {
    fn default() -> Self {
        TimeStepConfig::Fixed { dt: 0.016 }
    }
}

impl DomainBounds {
    /// Domain as a kernel bounding box.
    pub fn to_bounds(&self) -> Bounds {
        Bounds::from_min_max(Vec3::from_array(self.min), Vec3::from_array(self.max))
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: SimulationConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Check domain bounds
        for (axis, name) in ["x", "y", "z"].iter().enumerate() {
            if !(self.domain.min[axis] < self.domain.max[axis]) {
                return Err(invalid(format!(
                    "domain min.{name} must be less than max.{name}"
                )));
            }
        }

        if self.particle_count == 0 {
            return Err(invalid("particle_count must be at least 1"));
        }

        match self.spawn {
            SpawnConfig::Lattice { spacing } => {
                if !(spacing.is_finite() && spacing > 0.0) {
                    return Err(invalid("lattice spacing must be positive"));
                }
            }
            SpawnConfig::Sphere {
                radius,
                velocity_jitter,
                ..
            } => {
                if !(radius.is_finite() && radius > 0.0) {
                    return Err(invalid("sphere radius must be positive"));
                }
                if !(velocity_jitter.is_finite() && velocity_jitter >= 0.0) {
                    return Err(invalid("velocity_jitter must be non-negative"));
                }
            }
        }

        let geometry = &self.geometry;
        if !(geometry.weld_tolerance.is_finite() && geometry.weld_tolerance >= 0.0) {
            return Err(invalid("geometry weld_tolerance must be non-negative"));
        }
        if !(geometry.scale.is_finite() && geometry.scale > 0.0) {
            return Err(invalid("geometry scale must be positive"));
        }

        match self.time_step {
            TimeStepConfig::Fixed { dt } if !(dt.is_finite() && dt > 0.0) => {
                return Err(invalid("fixed dt must be positive"));
            }
            TimeStepConfig::WallClock { max_dt } if !(max_dt.is_finite() && max_dt > 0.0) => {
                return Err(invalid("wall-clock max_dt must be positive"));
            }
            _ => {}
        }

        // Check max_timesteps
        if let Some(max_timesteps) = self.max_timesteps {
            if max_timesteps == 0 {
                return Err(invalid("max_timesteps must be at least 1"));
            }
        }

        // Check max_time
        if let Some(max_time) = self.max_time {
            if !(max_time > 0.0) {
                return Err(invalid("max_time must be positive"));
            }
        }

        // Physical parameters are range-checked by the kernel.
        self.to_solver_params()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Map this configuration onto the kernel's solver parameters.
    pub fn to_solver_params(&self) -> SolverParams {
        SolverParams {
            smoothing_radius: self.smoothing_radius,
            particle_mass: self.particle_mass,
            rest_density: self.rest_density,
            gas_constant: self.stiffness,
            viscosity: self.viscosity,
            gravity: self.gravity,
            gravity_direction: Vec3::from_array(self.gravity_direction),
            wind: Vec3::from_array(self.wind),
            wind_strength: self.wind_strength,
            domain: self.domain.to_bounds(),
            collision: self.collision,
            octree: self.octree,
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
