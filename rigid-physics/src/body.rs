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
//! Rigid body state
//!
//! A [`RigidBody`] holds pose, velocities, mass properties, material and the
//! per-step force accumulators. Bodies are only created, mutated and destroyed
//! through the [`World`](crate::World); this module exposes read accessors
//! publicly and keeps mutation crate-private.
//!
//! The body pose is the placement of the shape's local frame. Dynamics run on
//! the center of mass, which may be offset from that origin for hulls and
//! compounds.

use crate::handle::{LeafId, ShapeHandle};
use crate::math::{Aabb, Mat3, Point3, Pose, Quat, Vec3};
use crate::shape::MassProperties;
use serde::{Deserialize, Serialize};

/// Kinematic classification of a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    /// Infinite mass, never moves
    Static,
    /// Infinite mass, moved by its velocity but never by contacts
    Kinematic,
    /// Finite mass, fully simulated
    Dynamic,
}

impl BodyType {
    /// Whether bodies of this type carry finite mass
    pub fn is_dynamic(self) -> bool {
        self == BodyType::Dynamic
    }
}

/// Surface and bulk material of a body
///
/// # Examples
///
/// ```
/// use rigid_physics::Material;
///
/// let rubber = Material::new(0.9, 0.8);
/// assert_eq!(rubber.restitution(), 0.8);
/// let clamped = Material::new(-1.0, 3.0);
/// assert_eq!(clamped.friction(), 0.0);
/// assert_eq!(clamped.restitution(), 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    friction: f64,
    restitution: f64,
    density: f64,
}

impl Material {
    /// Default density in kg/m³
    pub const DEFAULT_DENSITY: f64 = 1000.0;

    /// Create a material; friction is clamped to `>= 0`, restitution to `[0, 1]`
    pub fn new(friction: f64, restitution: f64) -> Self {
        let friction = if friction.is_finite() { friction.max(0.0) } else { 0.0 };
        let restitution = if restitution.is_finite() {
            restitution.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Material {
            friction,
            restitution,
            density: Self::DEFAULT_DENSITY,
        }
    }

    /// Replace the density used to derive mass
    pub fn with_density(mut self, density: f64) -> Self {
        if density > 0.0 && density.is_finite() {
            self.density = density;
        }
        self
    }

    /// Coulomb friction coefficient
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Coefficient of restitution
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Density in kg/m³
    pub fn density(&self) -> f64 {
        self.density
    }

    /// Friction of a contact between two materials (geometric mean)
    pub fn combined_friction(&self, other: &Material) -> f64 {
        (self.friction * other.friction).sqrt()
    }

    /// Restitution of a contact between two materials (maximum)
    pub fn combined_restitution(&self, other: &Material) -> f64 {
        self.restitution.max(other.restitution)
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::new(0.5, 0.0)
    }
}

/// Membership/filter bit masks deciding which bodies interact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionGroups {
    /// Groups this body belongs to
    pub memberships: u32,
    /// Groups this body interacts with
    pub filter: u32,
}

impl CollisionGroups {
    /// Member of and interacting with every group
    pub const ALL: CollisionGroups = CollisionGroups {
        memberships: u32::MAX,
        filter: u32::MAX,
    };

    /// Create groups from masks
    pub fn new(memberships: u32, filter: u32) -> Self {
        CollisionGroups {
            memberships,
            filter,
        }
    }

    /// Whether two bodies with these groups interact
    pub fn interacts_with(&self, other: &CollisionGroups) -> bool {
        (self.memberships & other.filter) != 0 && (other.memberships & self.filter) != 0
    }
}

impl Default for CollisionGroups {
    fn default() -> Self {
        CollisionGroups::ALL
    }
}

/// Everything needed to create a body
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub(crate) body_type: BodyType,
    pub(crate) shape: ShapeHandle,
    pub(crate) pose: Pose,
    pub(crate) material: Material,
    pub(crate) linear_velocity: Vec3,
    pub(crate) angular_velocity: Vec3,
    pub(crate) mass_override: Option<f64>,
    pub(crate) groups: CollisionGroups,
    pub(crate) sensor: bool,
    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,
}

impl BodyDesc {
    /// Describe a body of the given classification at the origin
    pub fn new(body_type: BodyType, shape: ShapeHandle) -> Self {
        BodyDesc {
            body_type,
            shape,
            pose: Pose::identity(),
            material: Material::default(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            mass_override: None,
            groups: CollisionGroups::ALL,
            sensor: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }

    /// Describe a dynamic body
    pub fn dynamic(shape: ShapeHandle) -> Self {
        BodyDesc::new(BodyType::Dynamic, shape)
    }

    /// Describe a static body
    pub fn fixed(shape: ShapeHandle) -> Self {
        BodyDesc::new(BodyType::Static, shape)
    }

    /// Describe a kinematic body
    pub fn kinematic(shape: ShapeHandle) -> Self {
        BodyDesc::new(BodyType::Kinematic, shape)
    }

    /// Set the initial pose
    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    /// Set the initial position, keeping the orientation
    pub fn at(mut self, x: f64, y: f64, z: f64) -> Self {
        self.pose.translation.vector = Vec3::new(x, y, z);
        self
    }

    /// Set the material
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Override the mass derived from density
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass_override = Some(mass);
        self
    }

    /// Set the initial linear velocity
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    /// Set the initial angular velocity (world space, rad/s)
    pub fn with_angular_velocity(mut self, angular: Vec3) -> Self {
        self.angular_velocity = angular;
        self
    }

    /// Set collision groups
    pub fn with_groups(mut self, groups: CollisionGroups) -> Self {
        self.groups = groups;
        self
    }

    /// Make the body a sensor that reports overlaps without contact response
    pub fn sensor(mut self, sensor: bool) -> Self {
        self.sensor = sensor;
        self
    }

    /// Set linear and angular damping coefficients
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
        self
    }

    /// Shape the body will reference
    pub fn shape(&self) -> ShapeHandle {
        self.shape
    }
}

/// State saved after every healthy step, restored when integration blows up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct KnownGoodState {
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

/// A simulated rigid body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    body_type: BodyType,
    shape: ShapeHandle,
    pose: Pose,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    mass: MassProperties,
    material: Material,
    groups: CollisionGroups,
    sensor: bool,
    linear_damping: f64,
    angular_damping: f64,
    force: Vec3,
    torque: Vec3,
    aabb: Aabb,
    leaf: LeafId,
    known_good: KnownGoodState,
    unstable: bool,
}

impl RigidBody {
    pub(crate) fn new(desc: &BodyDesc, mass: MassProperties, aabb: Aabb, leaf: LeafId) -> Self {
        let mass = match (desc.body_type, desc.mass_override) {
            (BodyType::Dynamic, Some(m)) => mass.with_mass(m),
            (BodyType::Dynamic, None) => mass,
            _ => mass.into_infinite(),
        };
        let (linear_velocity, angular_velocity) = match desc.body_type {
            BodyType::Static => (Vec3::zeros(), Vec3::zeros()),
            _ => (desc.linear_velocity, desc.angular_velocity),
        };
        RigidBody {
            body_type: desc.body_type,
            shape: desc.shape,
            pose: desc.pose,
            linear_velocity,
            angular_velocity,
            mass,
            material: desc.material,
            groups: desc.groups,
            sensor: desc.sensor,
            linear_damping: desc.linear_damping,
            angular_damping: desc.angular_damping,
            force: Vec3::zeros(),
            torque: Vec3::zeros(),
            aabb,
            leaf,
            known_good: KnownGoodState {
                pose: desc.pose,
                linear_velocity,
                angular_velocity,
            },
            unstable: false,
        }
    }

    /// Kinematic classification
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Whether the body is dynamic
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Whether the body is static
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Whether the body is kinematic
    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    /// Shape referenced by the body
    pub fn shape(&self) -> ShapeHandle {
        self.shape
    }

    /// Pose of the shape frame
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Position of the shape frame origin
    pub fn position(&self) -> Point3 {
        Point3::from(self.pose.translation.vector)
    }

    /// Orientation
    pub fn orientation(&self) -> Quat {
        self.pose.rotation
    }

    /// Center of mass in world space
    pub fn center_of_mass(&self) -> Point3 {
        self.pose * self.mass.local_center
    }

    /// Linear velocity of the center of mass
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    /// Angular velocity in world space (rad/s)
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// Velocity of a world-space point rigidly attached to the body
    pub fn velocity_at_point(&self, point: &Point3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(&(point - self.center_of_mass()))
    }

    /// Mass properties
    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass
    }

    /// Mass in kilograms; 0 for infinite mass
    pub fn mass(&self) -> f64 {
        self.mass.mass
    }

    /// Inverse mass; 0 for static and kinematic bodies
    pub fn inverse_mass(&self) -> f64 {
        self.mass.inv_mass
    }

    /// Inverse inertia tensor rotated into world space
    pub fn inverse_inertia_world(&self) -> Mat3 {
        if self.mass.inv_mass == 0.0 {
            return Mat3::zeros();
        }
        let rot = self.pose.rotation.to_rotation_matrix();
        rot.matrix() * self.mass.inv_inertia * rot.matrix().transpose()
    }

    /// Material
    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Collision groups
    pub fn groups(&self) -> CollisionGroups {
        self.groups
    }

    /// Whether the body only reports overlaps
    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    /// Force accumulated since the last step
    pub fn accumulated_force(&self) -> Vec3 {
        self.force
    }

    /// Torque accumulated since the last step
    pub fn accumulated_torque(&self) -> Vec3 {
        self.torque
    }

    /// Tight world-space bounds as of the last refresh
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Whether the last integration produced NaN/Inf and the body was clamped
    pub fn is_unstable(&self) -> bool {
        self.unstable
    }

    /// Linear and angular damping coefficients
    pub fn damping(&self) -> (f64, f64) {
        (self.linear_damping, self.angular_damping)
    }

    pub(crate) fn leaf(&self) -> LeafId {
        self.leaf
    }

    pub(crate) fn set_leaf(&mut self, leaf: LeafId) {
        self.leaf = leaf;
    }

    pub(crate) fn set_aabb(&mut self, aabb: Aabb) {
        self.aabb = aabb;
    }

    pub(crate) fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub(crate) fn set_linear_velocity(&mut self, v: Vec3) {
        self.linear_velocity = v;
    }

    pub(crate) fn set_angular_velocity(&mut self, w: Vec3) {
        self.angular_velocity = w;
    }

    pub(crate) fn add_force(&mut self, force: Vec3) {
        self.force += force;
    }

    pub(crate) fn add_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    pub(crate) fn clear_accumulators(&mut self) {
        self.force = Vec3::zeros();
        self.torque = Vec3::zeros();
    }

    /// Apply an impulse through the center of mass
    pub(crate) fn apply_linear_impulse(&mut self, impulse: &Vec3) {
        self.linear_velocity += impulse * self.mass.inv_mass;
    }

    /// Apply an angular impulse
    pub(crate) fn apply_angular_impulse(&mut self, impulse: &Vec3) {
        self.angular_velocity += self.inverse_inertia_world() * impulse;
    }

    /// Whether pose and velocities are all finite
    pub(crate) fn is_finite(&self) -> bool {
        self.pose.translation.vector.iter().all(|v| v.is_finite())
            && self.pose.rotation.coords.iter().all(|v| v.is_finite())
            && self.linear_velocity.iter().all(|v| v.is_finite())
            && self.angular_velocity.iter().all(|v| v.is_finite())
    }

    /// Record the current state as the fallback for numerical blow-ups
    pub(crate) fn mark_good(&mut self) {
        self.known_good = KnownGoodState {
            pose: self.pose,
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
        };
        self.unstable = false;
    }

    /// Return to the last good pose at rest and flag the body
    pub(crate) fn clamp_to_known_good(&mut self) {
        self.pose = self.known_good.pose;
        self.linear_velocity = Vec3::zeros();
        self.angular_velocity = Vec3::zeros();
        self.clear_accumulators();
        self.unstable = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    fn body(body_type: BodyType) -> RigidBody {
        let shape = Shape::sphere(1.0);
        let desc = BodyDesc::new(body_type, ShapeHandle::new(0, 0)).with_velocity(Vec3::x());
        RigidBody::new(
            &desc,
            shape.mass_properties(1.0),
            shape.world_aabb(&desc.pose),
            LeafId::new(0, 0),
        )
    }

    #[test]
    fn test_inverse_mass_matches_classification() {
        assert!(body(BodyType::Dynamic).inverse_mass() > 0.0);
        for t in [BodyType::Static, BodyType::Kinematic] {
            let b = body(t);
            assert_eq!(b.inverse_mass(), 0.0);
            assert_eq!(b.inverse_inertia_world(), Mat3::zeros());
        }
    }

    #[test]
    fn test_static_body_ignores_initial_velocity() {
        assert_eq!(body(BodyType::Static).linear_velocity(), Vec3::zeros());
        assert_eq!(body(BodyType::Kinematic).linear_velocity(), Vec3::x());
    }

    #[test]
    fn test_clamp_to_known_good() {
        let mut b = body(BodyType::Dynamic);
        b.mark_good();
        b.set_linear_velocity(Vec3::new(f64::NAN, 0.0, 0.0));
        b.set_pose(Pose::translation(f64::INFINITY, 0.0, 0.0));
        assert!(!b.is_finite());
        b.clamp_to_known_good();
        assert!(b.is_finite());
        assert!(b.is_unstable());
        assert_eq!(b.position(), Point3::origin());
    }

    #[test]
    fn test_collision_groups() {
        let a = CollisionGroups::new(0b01, 0b10);
        let b = CollisionGroups::new(0b10, 0b01);
        let c = CollisionGroups::new(0b10, 0b10);
        assert!(a.interacts_with(&b));
        assert!(!a.interacts_with(&c));
        assert!(CollisionGroups::ALL.interacts_with(&b));
    }

    #[test]
    fn test_velocity_at_point() {
        let mut b = body(BodyType::Dynamic);
        b.set_linear_velocity(Vec3::zeros());
        b.set_angular_velocity(Vec3::new(0.0, 0.0, 1.0));
        let v = b.velocity_at_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((v - Vec3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
    }
}
