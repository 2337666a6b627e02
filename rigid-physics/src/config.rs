// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Simulation parameters
//!
//! The surrounding engine owns configuration loading; this module only defines
//! the recognized options, their defaults and their validation. The struct is
//! serde-enabled so any loader format can produce it.

use crate::error::{PhysicsError, Result};
use crate::math::Vec3;
use serde::{Deserialize, Serialize};

/// Tunable parameters of a [`World`](crate::World)
///
/// # Examples
///
/// ```
/// use rigid_physics::SimulationConfig;
///
/// let config = SimulationConfig::default()
///     .with_timestep(1.0 / 120.0)
///     .with_solver_iterations(12);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed step size in seconds
    pub fixed_timestep: f64,
    /// Solver passes per step; more passes give stiffer stacks
    pub solver_iterations: usize,
    /// Gravity acceleration applied to dynamic bodies
    pub gravity: Vec3,
    /// Fraction of penetration corrected per step
    pub baumgarte_factor: f64,
    /// Penetration depth left uncorrected to keep resting contacts alive
    pub penetration_slop: f64,
    /// Approach speed below which restitution is ignored
    pub restitution_threshold: f64,
    /// Static margin added to broad-phase leaf bounds
    pub aabb_margin: f64,
    /// Scale applied to the per-step displacement when fattening leaf bounds
    pub velocity_margin_scale: f64,
    /// Separation under which the narrow-phase still reports contacts
    pub speculative_margin: f64,
    /// Iteration cap of the GJK distance loop
    pub gjk_max_iterations: usize,
    /// Iteration cap of the EPA expansion loop
    pub epa_max_iterations: usize,
    /// EPA face convergence tolerance
    pub epa_tolerance: f64,
    /// Solver stops early once no impulse changes by more than this
    pub solver_tolerance: f64,
    /// Re-apply last step's impulses before iterating
    pub warm_starting: bool,
    /// Upper bound on live bodies (and broad-phase leaves)
    pub max_bodies: usize,
    /// Upper bound on live contact manifolds
    pub max_manifolds: usize,
    /// Upper bound on fixed steps consumed by a single `update` call
    pub max_steps_per_update: usize,
    /// Run narrow-phase pair tests on the rayon pool when available
    pub parallel_narrow_phase: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            fixed_timestep: 1.0 / 60.0,
            solver_iterations: 8,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            baumgarte_factor: 0.2,
            penetration_slop: 0.005,
            restitution_threshold: 1.0,
            aabb_margin: 0.1,
            velocity_margin_scale: 1.0,
            speculative_margin: 0.02,
            gjk_max_iterations: 64,
            epa_max_iterations: 64,
            epa_tolerance: 1e-4,
            solver_tolerance: 1e-6,
            warm_starting: true,
            max_bodies: 16_384,
            max_manifolds: 65_536,
            max_steps_per_update: 8,
            parallel_narrow_phase: true,
        }
    }
}

impl SimulationConfig {
    /// Set the fixed timestep
    pub fn with_timestep(mut self, dt: f64) -> Self {
        self.fixed_timestep = dt;
        self
    }

    /// Set the solver iteration count
    pub fn with_solver_iterations(mut self, iterations: usize) -> Self {
        self.solver_iterations = iterations;
        self
    }

    /// Set gravity
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set the Baumgarte correction factor
    pub fn with_baumgarte(mut self, factor: f64) -> Self {
        self.baumgarte_factor = factor;
        self
    }

    /// Enable or disable warm starting
    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.warm_starting = enabled;
        self
    }

    /// Set body and manifold capacities
    pub fn with_capacity(mut self, max_bodies: usize, max_manifolds: usize) -> Self {
        self.max_bodies = max_bodies;
        self.max_manifolds = max_manifolds;
        self
    }

    /// Check every option
    ///
    /// Hard errors are returned as [`PhysicsError::InvalidConfig`]. Values that
    /// are legal but likely to misbehave (very small or very large timesteps)
    /// are only logged.
    pub fn validate(&self) -> Result<()> {
        let dt = self.fixed_timestep;
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(PhysicsError::InvalidConfig(format!(
                "timestep must be positive and finite, got {}",
                dt
            )));
        }
        if dt < 1e-6 {
            log::warn!(
                "timestep {} is extremely small and may cause precision loss",
                dt
            );
        }
        if dt > 0.1 {
            log::warn!("timestep {} is large and may cause solver instability", dt);
        }
        if self.solver_iterations == 0 {
            return Err(PhysicsError::InvalidConfig(
                "solver_iterations must be at least 1".to_string(),
            ));
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(PhysicsError::InvalidConfig(
                "gravity must be finite".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.baumgarte_factor) {
            return Err(PhysicsError::InvalidConfig(format!(
                "baumgarte_factor must be in [0, 1], got {}",
                self.baumgarte_factor
            )));
        }
        let non_negative = [
            ("penetration_slop", self.penetration_slop),
            ("restitution_threshold", self.restitution_threshold),
            ("aabb_margin", self.aabb_margin),
            ("velocity_margin_scale", self.velocity_margin_scale),
            ("speculative_margin", self.speculative_margin),
            ("solver_tolerance", self.solver_tolerance),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(PhysicsError::InvalidConfig(format!(
                    "{} must be non-negative and finite, got {}",
                    name, value
                )));
            }
        }
        if self.epa_tolerance.is_nan() || self.epa_tolerance <= 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "epa_tolerance must be positive".to_string(),
            ));
        }
        if self.gjk_max_iterations == 0 || self.epa_max_iterations == 0 {
            return Err(PhysicsError::InvalidConfig(
                "GJK and EPA iteration caps must be at least 1".to_string(),
            ));
        }
        if self.max_bodies == 0 || self.max_manifolds == 0 || self.max_steps_per_update == 0 {
            return Err(PhysicsError::InvalidConfig(
                "capacities must be at least 1".to_string(),
            ));
        }
        if self.max_bodies > u32::MAX as usize / 2 {
            return Err(PhysicsError::InvalidConfig(format!(
                "max_bodies {} exceeds the handle index range",
                self.max_bodies
            )));
        }
        Ok(())
    }
}
