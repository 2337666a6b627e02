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
//! Shape library
//!
//! Shapes form a closed set of variants stored by value. Every variant exposes
//! a support mapping (the farthest point along a direction) and a local
//! bounding box; the narrow-phase and the query service dispatch on the
//! variant tag instead of going through trait objects.
//!
//! Local frames:
//! - `Sphere` is centered on the origin
//! - `Box` is centered on the origin, axis-aligned, given by half extents
//! - `Capsule` is a segment from `-half_height` to `+half_height` along Y, swept by `radius`
//! - `ConvexHull` is the convex hull of a point cloud
//! - `Compound` places convex children at local poses

mod mass;
mod registry;

pub use mass::MassProperties;
pub use registry::ShapeRegistry;

use crate::error::{PhysicsError, Result};
use crate::math::{Aabb, Point3, Pose, Vec3, EPSILON};
use serde::{Deserialize, Serialize};

/// A collision shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Sphere around the origin
    Sphere {
        /// Radius
        radius: f64,
    },
    /// Axis-aligned box around the origin
    Box {
        /// Half extent along each axis
        half_extents: Vec3,
    },
    /// Segment along Y swept by a sphere
    Capsule {
        /// Half length of the inner segment
        half_height: f64,
        /// Radius
        radius: f64,
    },
    /// Convex hull of a point cloud
    ConvexHull(ConvexHull),
    /// Convex children at local poses
    Compound(Compound),
}

/// Point cloud whose convex hull is the shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvexHull {
    points: Vec<Point3>,
}

impl ConvexHull {
    /// Vertices of the hull
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    fn support(&self, dir: &Vec3) -> Point3 {
        let mut best = self.points[0];
        let mut best_dot = best.coords.dot(dir);
        for p in &self.points[1..] {
            let d = p.coords.dot(dir);
            if d > best_dot {
                best_dot = d;
                best = *p;
            }
        }
        best
    }
}

/// One child of a compound shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundChild {
    /// Pose of the child relative to the compound's origin
    pub pose: Pose,
    /// The child shape; never itself a compound
    pub shape: Shape,
}

/// A rigid aggregate of convex shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    children: Vec<CompoundChild>,
}

impl Compound {
    /// Children of the compound
    pub fn children(&self) -> &[CompoundChild] {
        &self.children
    }
}

/// The convex "core" of a shape plus a rounding radius
///
/// Spheres and capsules are a point and a segment inflated by a radius. The
/// narrow-phase runs GJK on the core and adds the radius back, which keeps
/// curved contacts exact and avoids running EPA on shallow overlaps.
#[derive(Debug, Clone, Copy)]
pub enum Core<'a> {
    /// A single point at the local origin
    Point,
    /// Segment from `-half_height` to `+half_height` along Y
    Segment(f64),
    /// The full shape
    Full(&'a Shape),
}

impl Shape {
    /// Sphere of the given radius
    pub fn sphere(radius: f64) -> Self {
        Shape::Sphere { radius }
    }

    /// Box with the given half extents
    pub fn cuboid(hx: f64, hy: f64, hz: f64) -> Self {
        Shape::Box {
            half_extents: Vec3::new(hx, hy, hz),
        }
    }

    /// Capsule along Y
    pub fn capsule(half_height: f64, radius: f64) -> Self {
        Shape::Capsule {
            half_height,
            radius,
        }
    }

    /// Convex hull of a point cloud
    ///
    /// Fails with [`PhysicsError::DegenerateGeometry`] for fewer than four
    /// points, non-finite coordinates or a flat (zero-volume) cloud.
    pub fn convex_hull(points: Vec<Point3>) -> Result<Self> {
        let shape = Shape::ConvexHull(ConvexHull { points });
        shape.validate()?;
        Ok(shape)
    }

    /// Compound of convex children
    pub fn compound(children: Vec<CompoundChild>) -> Result<Self> {
        let shape = Shape::Compound(Compound { children });
        shape.validate()?;
        Ok(shape)
    }

    /// Short name of the variant, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Sphere { .. } => "sphere",
            Shape::Box { .. } => "box",
            Shape::Capsule { .. } => "capsule",
            Shape::ConvexHull(_) => "convex hull",
            Shape::Compound(_) => "compound",
        }
    }

    /// Whether the shape is a single convex volume
    pub fn is_convex(&self) -> bool {
        !matches!(self, Shape::Compound(_))
    }

    /// Reject zero-extent or malformed shapes
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v > EPSILON && v.is_finite();
        match self {
            Shape::Sphere { radius } => {
                if !positive(*radius) {
                    return Err(PhysicsError::DegenerateGeometry(format!(
                        "sphere radius {} must be positive",
                        radius
                    )));
                }
            }
            Shape::Box { half_extents } => {
                if !half_extents.iter().all(|h| positive(*h)) {
                    return Err(PhysicsError::DegenerateGeometry(format!(
                        "box half extents {:?} must be positive",
                        half_extents.as_slice()
                    )));
                }
            }
            Shape::Capsule {
                half_height,
                radius,
            } => {
                if !positive(*radius) || !(*half_height >= 0.0 && half_height.is_finite()) {
                    return Err(PhysicsError::DegenerateGeometry(format!(
                        "capsule radius {} / half height {} invalid",
                        radius, half_height
                    )));
                }
            }
            Shape::ConvexHull(hull) => validate_hull(&hull.points)?,
            Shape::Compound(compound) => {
                if compound.children.is_empty() {
                    return Err(PhysicsError::DegenerateGeometry(
                        "compound has no children".to_string(),
                    ));
                }
                for child in &compound.children {
                    if !child.shape.is_convex() {
                        return Err(PhysicsError::DegenerateGeometry(
                            "compound children must be convex".to_string(),
                        ));
                    }
                    let t = &child.pose.translation.vector;
                    if !t.iter().all(|v| v.is_finite()) {
                        return Err(PhysicsError::DegenerateGeometry(
                            "compound child pose is not finite".to_string(),
                        ));
                    }
                    child.shape.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Farthest point of the shape along `dir`, in local space
    pub fn support(&self, dir: &Vec3) -> Point3 {
        match self {
            Shape::Sphere { radius } => {
                let n = dir.norm();
                if n < EPSILON {
                    Point3::new(*radius, 0.0, 0.0)
                } else {
                    Point3::from(dir * (*radius / n))
                }
            }
            Shape::Box { half_extents } => Point3::new(
                half_extents.x.copysign(sign_of(dir.x)),
                half_extents.y.copysign(sign_of(dir.y)),
                half_extents.z.copysign(sign_of(dir.z)),
            ),
            Shape::Capsule {
                half_height,
                radius,
            } => {
                let tip = Point3::new(0.0, half_height.copysign(sign_of(dir.y)), 0.0);
                let n = dir.norm();
                if n < EPSILON {
                    tip
                } else {
                    tip + dir * (*radius / n)
                }
            }
            Shape::ConvexHull(hull) => hull.support(dir),
            Shape::Compound(compound) => {
                let mut best = Point3::origin();
                let mut best_dot = f64::NEG_INFINITY;
                for child in &compound.children {
                    let local_dir = child.pose.rotation.inverse_transform_vector(dir);
                    let p = child.pose * child.shape.support(&local_dir);
                    let d = p.coords.dot(dir);
                    if d > best_dot {
                        best_dot = d;
                        best = p;
                    }
                }
                best
            }
        }
    }

    /// Support point in world space for a shape placed at `pose`
    pub fn support_world(&self, pose: &Pose, dir: &Vec3) -> Point3 {
        let local_dir = pose.rotation.inverse_transform_vector(dir);
        pose * self.support(&local_dir)
    }

    /// Bounding box in local space
    pub fn local_aabb(&self) -> Aabb {
        match self {
            Shape::Sphere { radius } => Aabb::from_center(Point3::origin(), Vec3::repeat(*radius)),
            Shape::Box { half_extents } => Aabb::from_center(Point3::origin(), *half_extents),
            Shape::Capsule {
                half_height,
                radius,
            } => Aabb::from_center(
                Point3::origin(),
                Vec3::new(*radius, half_height + radius, *radius),
            ),
            Shape::ConvexHull(hull) => Aabb::from_points(&hull.points)
                .unwrap_or_else(|| Aabb::from_center(Point3::origin(), Vec3::zeros())),
            Shape::Compound(compound) => {
                let mut iter = compound
                    .children
                    .iter()
                    .map(|c| c.shape.local_aabb().transformed(&c.pose));
                match iter.next() {
                    Some(first) => iter.fold(first, |acc, b| acc.merged(&b)),
                    None => Aabb::from_center(Point3::origin(), Vec3::zeros()),
                }
            }
        }
    }

    /// Bounding box in world space for a shape placed at `pose`
    pub fn world_aabb(&self, pose: &Pose) -> Aabb {
        match self {
            // Rotation-invariant, so the tight box is exact
            Shape::Sphere { radius } => {
                Aabb::from_center(Point3::from(pose.translation.vector), Vec3::repeat(*radius))
            }
            Shape::Capsule {
                half_height,
                radius,
            } => {
                let axis = pose.rotation * Vec3::new(0.0, *half_height, 0.0);
                let c = Point3::from(pose.translation.vector);
                let seg = Aabb::new(c - axis, c - axis).merged(&Aabb::new(c + axis, c + axis));
                seg.expanded(*radius)
            }
            _ => self.local_aabb().transformed(pose),
        }
    }

    /// The convex core and rounding radius used by the distance queries
    pub fn core(&self) -> (Core<'_>, f64) {
        match self {
            Shape::Sphere { radius } => (Core::Point, *radius),
            Shape::Capsule {
                half_height,
                radius,
            } => (Core::Segment(*half_height), *radius),
            other => (Core::Full(other), 0.0),
        }
    }

    /// Mass properties for a uniform density
    pub fn mass_properties(&self, density: f64) -> MassProperties {
        mass::compute(self, density)
    }
}

impl Core<'_> {
    /// Support point of the core in local space
    pub fn support(&self, dir: &Vec3) -> Point3 {
        match self {
            Core::Point => Point3::origin(),
            Core::Segment(h) => Point3::new(0.0, h.copysign(sign_of(dir.y)), 0.0),
            Core::Full(shape) => shape.support(dir),
        }
    }
}

#[inline]
fn sign_of(v: f64) -> f64 {
    if v >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

fn validate_hull(points: &[Point3]) -> Result<()> {
    if points.len() < 4 {
        return Err(PhysicsError::DegenerateGeometry(format!(
            "convex hull needs at least 4 points, got {}",
            points.len()
        )));
    }
    if !points.iter().all(|p| p.iter().all(|v| v.is_finite())) {
        return Err(PhysicsError::DegenerateGeometry(
            "convex hull has non-finite points".to_string(),
        ));
    }
    let a = points[0];
    let b = points
        .iter()
        .copied()
        .max_by(|p, q| (p - a).norm_squared().total_cmp(&(q - a).norm_squared()))
        .unwrap_or(a);
    let ab = b - a;
    let c = points
        .iter()
        .copied()
        .max_by(|p, q| {
            ab.cross(&(p - a))
                .norm_squared()
                .total_cmp(&ab.cross(&(q - a)).norm_squared())
        })
        .unwrap_or(a);
    let normal = ab.cross(&(c - a));
    let volume = points
        .iter()
        .map(|p| normal.dot(&(p - a)).abs())
        .fold(0.0, f64::max);
    let scale = ab.norm().max(1.0);
    if normal.norm() < EPSILON * scale || volume < 1e-9 * scale * scale * scale {
        return Err(PhysicsError::DegenerateGeometry(
            "convex hull points are coplanar".to_string(),
        ));
    }
    Ok(())
}
