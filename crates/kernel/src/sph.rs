//! SPH smoothing kernels and the per-step particle passes.
//!
//! Kernels are the classic Müller et al. (2003) set, all with compact support
//! `h`:
//! - poly6 for density,
//! - the spiky gradient for pressure,
//! - the viscosity laplacian for viscous diffusion.
//!
//! Every pass reads an immutable snapshot of the particle slice and collects
//! its results into a separate vector before writing them back, so rayon
//! workers never observe each other's writes.

use std::f32::consts::PI;

use glam::Vec3;
use rayon::prelude::*;

use crate::eos;
use crate::neighbor::NeighborList;
use crate::particle::Particle;

/// Distances below this are treated as coincident; the spiky gradient is zero
/// there.
pub const GRADIENT_EPSILON: f32 = 1.0e-6;

/// Poly6 smoothing kernel, evaluated on the squared distance.
///
/// ```text
/// W(r, h) = 315 / (64 pi h^9) * (h^2 - r^2)^3   for r <= h
/// W(r, h) = 0                                    otherwise
/// ```
#[inline]
pub fn poly6(r_sq: f32, h: f32) -> f32 {
    let h_sq = h * h;
    if !(r_sq < h_sq) || r_sq < 0.0 {
        return 0.0;
    }
    let diff = h_sq - r_sq;
    let h9 = h_sq * h_sq * h_sq * h_sq * h;
    315.0 / (64.0 * PI * h9) * diff * diff * diff
}

/// Gradient of the spiky kernel with respect to `x_i`, given `r_ij = x_i - x_j`.
///
/// ```text
/// grad W = -45 / (pi h^6) * (h - r)^2 * r_ij / r   for eps <= r < h
/// ```
///
/// Zero for coincident particles and beyond the support.
#[inline]
pub fn spiky_gradient(r_ij: Vec3, h: f32) -> Vec3 {
    let r = r_ij.length();
    if !(r < h) || r < GRADIENT_EPSILON {
        return Vec3::ZERO;
    }
    let h3 = h * h * h;
    let diff = h - r;
    r_ij * (-45.0 / (PI * h3 * h3) * diff * diff / r)
}

/// Laplacian of the viscosity kernel.
///
/// ```text
/// lap W = 45 / (pi h^6) * (h - r)   for r < h
/// ```
#[inline]
pub fn viscosity_laplacian(r: f32, h: f32) -> f32 {
    if !(r < h) || r < 0.0 {
        return 0.0;
    }
    let h3 = h * h * h;
    45.0 / (PI * h3 * h3) * (h - r)
}

/// Fluid constants shared by the density and force passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluidConstants {
    /// Smoothing radius h.
    pub smoothing_radius: f32,
    /// Mass of every particle.
    pub particle_mass: f32,
    /// Rest density rho0.
    pub rest_density: f32,
    /// Stiffness k of the equation of state.
    pub gas_constant: f32,
    /// Dynamic viscosity mu.
    pub viscosity: f32,
}

// ---------------------------------------------------------------------------
// Density and pressure
// ---------------------------------------------------------------------------

/// Compute density and pressure for all particles.
///
/// ```text
/// rho_i = m W(0) + sum_{j != i} m W(|x_i - x_j|^2)
/// p_i   = k (rho_i - rho0)
/// ```
///
/// The explicit self term keeps every density strictly positive, so later
/// divisions by density are always defined.
pub fn compute_density_pressure(
    particles: &mut [Particle],
    neighbors: &NeighborList,
    fluid: &FluidConstants,
) {
    let h = fluid.smoothing_radius;
    let m = fluid.particle_mass;
    let self_density = m * poly6(0.0, h);

    let snapshot: &[Particle] = particles;
    let densities: Vec<f32> = (0..snapshot.len())
        .into_par_iter()
        .map(|i| {
            let xi = snapshot[i].position;
            neighbors
                .neighbors(i)
                .iter()
                .map(|&j| j as usize)
                .filter(|&j| j != i)
                .fold(self_density, |rho, j| {
                    rho + m * poly6(xi.distance_squared(snapshot[j].position), h)
                })
        })
        .collect();

    particles
        .par_iter_mut()
        .zip(densities)
        .for_each(|(p, rho)| {
            p.density = rho;
            p.pressure = eos::linear_eos(rho, fluid.rest_density, fluid.gas_constant);
        });
}

// ---------------------------------------------------------------------------
// Forces
// ---------------------------------------------------------------------------

/// Compute the total force on every particle, overwriting `force`.
///
/// ```text
/// f_p = sum_{j != i} -m (p_i + p_j) / (2 rho_j) * grad W_spiky(x_i - x_j)
/// f_v = sum_{j != i}  mu m / rho_j * (v_j - v_i) * lap W_visc(r)
/// F_i = (m / rho_i) (f_p + f_v) + external
/// ```
///
/// `external` is the per-particle body force (mass times gravity and wind), added
/// unchanged to every particle. Requires densities from
/// [`compute_density_pressure`].
pub fn compute_forces(
    particles: &mut [Particle],
    neighbors: &NeighborList,
    fluid: &FluidConstants,
    external: Vec3,
) {
    let h = fluid.smoothing_radius;
    let m = fluid.particle_mass;
    let mu = fluid.viscosity;

    let snapshot: &[Particle] = particles;
    let forces: Vec<Vec3> = (0..snapshot.len())
        .into_par_iter()
        .map(|i| {
            let pi = &snapshot[i];
            let mut f_pressure = Vec3::ZERO;
            let mut f_viscosity = Vec3::ZERO;

            for &j in neighbors.neighbors(i) {
                let j = j as usize;
                if j == i {
                    continue;
                }
                let pj = &snapshot[j];
                let r_ij = pi.position - pj.position;

                f_pressure += spiky_gradient(r_ij, h)
                    * (-m * (pi.pressure + pj.pressure) / (2.0 * pj.density));
                f_viscosity += (pj.velocity - pi.velocity)
                    * (mu * m / pj.density * viscosity_laplacian(r_ij.length(), h));
            }

            (f_pressure + f_viscosity) * (m / pi.density) + external
        })
        .collect();

    particles
        .par_iter_mut()
        .zip(forces)
        .for_each(|(p, f)| p.force = f);
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

/// Semi-implicit Euler step into the predicted buffers.
///
/// ```text
/// v' = v + (F / m) dt
/// x' = x + v' dt
/// ```
///
/// The committed `position` and `velocity` are left untouched.
pub fn integrate(particles: &mut [Particle], particle_mass: f32, dt: f32) {
    let inv_mass = 1.0 / particle_mass;
    particles.par_iter_mut().for_each(|p| {
        let v = p.velocity + p.force * (inv_mass * dt);
        p.predicted_velocity = v;
        p.predicted_position = p.position + v * dt;
    });
}
