//! Particle state.
//!
//! Each particle carries its committed state (`position`, `velocity`) plus a
//! predicted copy that the integration and collision passes write into. The
//! solver commits the predicted buffers at the end of every step, so a pass
//! never reads a value another worker is writing in the same step.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// One SPH fluid particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Stable identifier, preserved across steps.
    pub id: u32,
    /// Committed position (meters).
    pub position: Vec3,
    /// Committed velocity (m/s).
    pub velocity: Vec3,
    /// Position after integration and collision, before commit.
    pub predicted_position: Vec3,
    /// Velocity after integration and collision, before commit.
    pub predicted_velocity: Vec3,
    /// Density from the last density pass (kg/m^3). Zero until the first step.
    pub density: f32,
    /// Pressure from the equation of state (Pa). Can be negative.
    pub pressure: f32,
    /// Total force from the last force pass (N).
    pub force: Vec3,
}

impl Particle {
    /// Create a particle at rest.
    pub fn new(id: u32, position: Vec3) -> Self {
        Self::with_velocity(id, position, Vec3::ZERO)
    }

    /// Create a particle with an initial velocity.
    ///
    /// Predicted buffers start equal to the committed state; density, pressure
    /// and force start at zero.
    pub fn with_velocity(id: u32, position: Vec3, velocity: Vec3) -> Self {
        Self {
            id,
            position,
            velocity,
            predicted_position: position,
            predicted_velocity: velocity,
            density: 0.0,
            pressure: 0.0,
            force: Vec3::ZERO,
        }
    }

    /// Copy the predicted buffers into the committed state.
    #[inline]
    pub fn commit(&mut self) {
        self.position = self.predicted_position;
        self.velocity = self.predicted_velocity;
    }
}
