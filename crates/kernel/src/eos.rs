//! Equation of state.
//!
//! The solver uses the linear (ideal-gas style) relation between density and
//! gauge pressure. Units follow the caller's scene; the default scene uses
//! air-like values (rest density 1.225 kg/m^3).

/// Linear equation of state.
///
/// ```text
/// P = k * (rho - rho0)
/// ```
///
/// # Arguments
/// * `density` - Current density rho.
/// * `rest_density` - Reference rest density rho0.
/// * `gas_constant` - Stiffness k.
///
/// # Returns
/// Gauge pressure. Negative (tension) when `density < rest_density`; the value
/// is never clamped.
#[inline]
pub fn linear_eos(density: f32, rest_density: f32, gas_constant: f32) -> f32 {
    gas_constant * (density - rest_density)
}
