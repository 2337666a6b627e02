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
//! Kinematic character controller
//!
//! The character is a kinematic capsule. Each move sweeps the capsule along
//! the requested displacement, stops a skin width short of whatever it hits,
//! and slides the rest of the way along the hit surface. Surfaces whose
//! normal is close enough to `up` count as ground.

use crate::body::{BodyDesc, CollisionGroups};
use crate::error::{PhysicsError, Result};
use crate::handle::{BodyHandle, ShapeHandle};
use crate::math::{Point3, Pose, Quat, Vec3, EPSILON};
use crate::query::{Hit, QueryFilter};
use crate::shape::Shape;
use crate::world::World;
use serde::{Deserialize, Serialize};

/// Character tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// Capsule radius
    pub radius: f64,
    /// Half length of the capsule's inner segment
    pub half_height: f64,
    /// Gap kept between the capsule and obstacles
    pub skin_width: f64,
    /// Steepest walkable slope, in radians from `up`
    pub max_slope_angle: f64,
    /// Sweeps per move before giving up on the remainder
    pub max_slides: usize,
    /// How far the character is pulled down onto ground it is about to leave
    pub ground_snap_distance: f64,
    /// Scale of the impulse given to dynamic bodies the character walks into
    pub push_strength: f64,
    /// World up direction
    pub up: Vec3,
    /// Groups the character collides with
    pub groups: CollisionGroups,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        CharacterConfig {
            radius: 0.4,
            half_height: 0.5,
            skin_width: 0.02,
            max_slope_angle: 45f64.to_radians(),
            max_slides: 4,
            ground_snap_distance: 0.1,
            push_strength: 1.0,
            up: Vec3::y(),
            groups: CollisionGroups::ALL,
        }
    }
}

impl CharacterConfig {
    /// Check that the tuning is usable
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !positive(self.radius) || !positive(self.half_height) {
            return Err(PhysicsError::InvalidConfig("character capsule must have positive size".into()));
        }
        if !non_negative(self.skin_width) || !non_negative(self.ground_snap_distance) || !non_negative(self.push_strength) {
            return Err(PhysicsError::InvalidConfig(
                "character skin, snap distance and push strength must be non-negative".into(),
            ));
        }
        if !(0.0..=std::f64::consts::FRAC_PI_2).contains(&self.max_slope_angle) {
            return Err(PhysicsError::InvalidConfig(format!(
                "max slope angle {} outside [0, pi/2]",
                self.max_slope_angle
            )));
        }
        if self.max_slides == 0 {
            return Err(PhysicsError::InvalidConfig("max_slides must be at least 1".into()));
        }
        if self.up.norm() <= EPSILON || !self.up.iter().all(|v| v.is_finite()) {
            return Err(PhysicsError::InvalidConfig("up must be a non-zero finite vector".into()));
        }
        Ok(())
    }
}

/// Outcome of [`CharacterController::move_and_slide`]
#[derive(Debug, Clone, PartialEq)]
pub struct MoveResult {
    /// Position after the move
    pub position: Point3,
    /// Displacement actually applied
    pub displacement: Vec3,
    /// Whether the character ended on walkable ground
    pub grounded: bool,
    /// Normal of the ground it stands on
    pub ground_normal: Option<Vec3>,
    /// Body it stands on
    pub ground_body: Option<BodyHandle>,
    /// Everything hit during the move, in hit order
    pub hits: Vec<Hit>,
}

/// A kinematic capsule moved by swept queries
#[derive(Debug, Clone)]
pub struct CharacterController {
    body: BodyHandle,
    shape: ShapeHandle,
    config: CharacterConfig,
    up: Vec3,
    grounded: bool,
}

impl CharacterController {
    /// Create the character's kinematic body at `position`
    pub fn new(world: &mut World, config: CharacterConfig, position: Point3) -> Result<Self> {
        config.validate()?;
        let up = config.up.normalize();
        let shape = world.add_shape(Shape::capsule(config.half_height, config.radius))?;
        let rotation = Quat::rotation_between(&Vec3::y(), &up).unwrap_or_else(|| Quat::from_scaled_axis(Vec3::x() * std::f64::consts::PI));
        let pose = Pose::from_parts(position.coords.into(), rotation);
        let created = world.create_body(
            BodyDesc::kinematic(shape)
                .with_pose(pose)
                .with_groups(config.groups),
        );
        // The body keeps the shape alive from here on
        world.release_shape(shape)?;
        let body = created?;
        Ok(CharacterController {
            body,
            shape,
            config,
            up,
            grounded: false,
        })
    }

    /// The character's kinematic body
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Tuning
    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    /// Whether the last move ended on walkable ground
    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    /// Current position of the capsule center
    pub fn position(&self, world: &World) -> Result<Point3> {
        Ok(world.body(self.body)?.position())
    }

    /// Remove the character's body from the world
    pub fn destroy(self, world: &mut World) -> Result<()> {
        world.destroy_body(self.body)
    }

    fn is_ground(&self, normal: &Vec3) -> bool {
        normal.dot(&self.up) >= self.config.max_slope_angle.cos() - EPSILON
    }

    /// Move by `displacement`, sliding along obstacles
    pub fn move_and_slide(&mut self, world: &mut World, displacement: Vec3) -> Result<MoveResult> {
        if !displacement.iter().all(|v| v.is_finite()) {
            return Err(PhysicsError::InvalidOperation("character displacement must be finite".into()));
        }
        let shape = world.shape(self.shape)?.clone();
        let start = *world.body(self.body)?.pose();
        let filter = QueryFilter::default()
            .excluding(self.body)
            .with_groups(self.config.groups);
        let skin = self.config.skin_width;
        let dt = world.config().fixed_timestep;

        let mut pose = start;
        let mut remaining = displacement;
        let mut hits = Vec::new();
        let mut ground: Option<Hit> = None;

        for _ in 0..self.config.max_slides {
            let length = remaining.norm();
            if length < EPSILON {
                break;
            }
            let dir = remaining / length;
            let Some(hit) = world.query().shape_cast(&shape, &pose, dir, length + skin, &filter)? else {
                pose.translation.vector += remaining;
                remaining = Vec3::zeros();
                break;
            };
            let travel = (hit.distance - skin).clamp(0.0, length);
            pose.translation.vector += dir * travel;

            let rest = remaining - dir * travel;
            let into = rest.dot(&hit.normal);
            if self.is_ground(&hit.normal) {
                ground = Some(hit);
            } else if into < 0.0 && self.config.push_strength > 0.0 && world.body(hit.body)?.is_dynamic() {
                let impulse = -hit.normal * (-into / dt) * self.config.push_strength;
                world.apply_impulse(hit.body, impulse)?;
            }
            hits.push(hit);
            remaining = if into < 0.0 { rest - hit.normal * into } else { rest };
        }

        if ground.is_none() && displacement.dot(&self.up) <= EPSILON {
            ground = self.snap_to_ground(world, &shape, &mut pose, &filter)?;
        }

        world.set_pose(self.body, pose)?;
        self.grounded = ground.is_some();
        Ok(MoveResult {
            position: Point3::from(pose.translation.vector),
            displacement: pose.translation.vector - start.translation.vector,
            grounded: self.grounded,
            ground_normal: ground.map(|h| h.normal),
            ground_body: ground.map(|h| h.body),
            hits,
        })
    }

    fn snap_to_ground(&self, world: &World, shape: &Shape, pose: &mut Pose, filter: &QueryFilter) -> Result<Option<Hit>> {
        let skin = self.config.skin_width;
        let reach = self.config.ground_snap_distance + skin;
        if reach <= 0.0 {
            return Ok(None);
        }
        let Some(hit) = world.query().shape_cast(shape, pose, -self.up, reach, filter)? else {
            return Ok(None);
        };
        if !self.is_ground(&hit.normal) {
            return Ok(None);
        }
        pose.translation.vector -= self.up * (hit.distance - skin).max(0.0);
        Ok(Some(hit))
    }
}
