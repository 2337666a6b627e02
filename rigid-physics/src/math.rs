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
//! Math primitives shared by every stage of the pipeline
//!
//! Linear algebra comes from `nalgebra` in double precision. This module only
//! adds the axis-aligned bounding box, the ray type and a few helpers that the
//! broad-phase, narrow-phase and solver all need.

use serde::{Deserialize, Serialize};

/// 3D vector
pub type Vec3 = nalgebra::Vector3<f64>;
/// 3D point
pub type Point3 = nalgebra::Point3<f64>;
/// Unit quaternion used for orientations
pub type Quat = nalgebra::UnitQuaternion<f64>;
/// 3x3 matrix used for inertia tensors
pub type Mat3 = nalgebra::Matrix3<f64>;
/// Rigid transform (translation + rotation)
pub type Pose = nalgebra::Isometry3<f64>;

/// Tolerance under which a length is treated as zero
pub const EPSILON: f64 = 1e-9;

/// Axis-aligned bounding box
///
/// # Examples
///
/// ```
/// use rigid_physics::math::{Aabb, Point3};
///
/// let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
/// let b = Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(2.0, 2.0, 2.0));
/// assert!(a.overlaps(&b));
/// assert_eq!(a.surface_area(), 6.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Point3,
    /// Maximum corner
    pub max: Point3,
}

impl Aabb {
    /// Create a box from its corners
    pub fn new(min: Point3, max: Point3) -> Self {
        Aabb { min, max }
    }

    /// Create a box from a center point and half extents
    pub fn from_center(center: Point3, half_extents: Vec3) -> Self {
        Aabb {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest box containing every point, or `None` for an empty slice
    pub fn from_points(points: &[Point3]) -> Option<Self> {
        let first = points.first()?;
        let mut aabb = Aabb::new(*first, *first);
        for p in &points[1..] {
            aabb.min = aabb.min.inf(p);
            aabb.max = aabb.max.sup(p);
        }
        Some(aabb)
    }

    /// Center of the box
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half extents of the box
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Union of two boxes
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Whether the two boxes overlap (touching counts)
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `other` lies entirely inside this box
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Grow the box uniformly by `margin` on every side
    pub fn expanded(&self, margin: f64) -> Aabb {
        let m = Vec3::repeat(margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Grow the box in the direction of a predicted displacement
    pub fn swept(&self, displacement: &Vec3) -> Aabb {
        let mut out = *self;
        for i in 0..3 {
            if displacement[i] < 0.0 {
                out.min[i] += displacement[i];
            } else {
                out.max[i] += displacement[i];
            }
        }
        out
    }

    /// Surface area, the cost metric of the BVH
    pub fn surface_area(&self) -> f64 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Whether every coordinate is finite
    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|v| v.is_finite())
    }

    /// World-space box bounding this local box after applying `pose`
    pub fn transformed(&self, pose: &Pose) -> Aabb {
        let center = pose * self.center();
        let rot = pose.rotation.to_rotation_matrix();
        let abs = rot.matrix().abs();
        let half = abs * self.half_extents();
        Aabb::from_center(center, half)
    }

    /// Slab test against the segment `origin + t * dir`, `t` in `[0, max_t]`
    ///
    /// Returns the entry parameter. Rays starting inside the box return `0`.
    pub fn ray_entry(&self, origin: &Point3, dir: &Vec3, max_t: f64) -> Option<f64> {
        let mut t_min = 0.0_f64;
        let mut t_max = max_t;
        for i in 0..3 {
            if dir[i].abs() < EPSILON {
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[i];
            let mut t0 = (self.min[i] - origin[i]) * inv;
            let mut t1 = (self.max[i] - origin[i]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// A ray with a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point
    pub origin: Point3,
    /// Unit direction
    pub dir: Vec3,
}

impl Ray {
    /// Create a ray, normalizing the direction
    ///
    /// Returns `None` when the direction has (near) zero length or is not finite.
    pub fn new(origin: Point3, dir: Vec3) -> Option<Self> {
        let len = dir.norm();
        if len < EPSILON || !len.is_finite() {
            return None;
        }
        Some(Ray {
            origin,
            dir: dir / len,
        })
    }

    /// Point at parameter `t`
    pub fn at(&self, t: f64) -> Point3 {
        self.origin + self.dir * t
    }
}

/// Orthonormal tangent basis for a unit normal
///
/// Deterministic in the normal, so friction impulses stored against this
/// basis stay meaningful from one step to the next.
pub fn tangent_frame(normal: &Vec3) -> (Vec3, Vec3) {
    let reference = if normal.x.abs() < 0.57735 {
        Vec3::x()
    } else if normal.y.abs() < 0.57735 {
        Vec3::y()
    } else {
        Vec3::z()
    };
    let t1 = normal.cross(&reference).normalize();
    let t2 = normal.cross(&t1);
    (t1, t2)
}

/// Normalize `v`, falling back to `fallback` when it is too short
pub fn normalize_or(v: &Vec3, fallback: Vec3) -> Vec3 {
    let len = v.norm();
    if len > EPSILON && len.is_finite() {
        v / len
    } else {
        fallback
    }
}

/// Closest points between segments `p1-q1` and `p2-q2`
///
/// Returns the parameters `(s, t)` along each segment.
pub fn closest_segment_params(p1: &Point3, q1: &Point3, p2: &Point3, q2: &Point3) -> (f64, f64) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    if a <= EPSILON && e <= EPSILON {
        return (0.0, 0.0);
    }
    if a <= EPSILON {
        return (0.0, (f / e).clamp(0.0, 1.0));
    }
    let c = d1.dot(&r);
    if e <= EPSILON {
        return ((-c / a).clamp(0.0, 1.0), 0.0);
    }
    let b = d1.dot(&d2);
    let denom = a * e - b * b;
    let mut s = if denom > EPSILON {
        ((b * f - c * e) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut t = (b * s + f) / e;
    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }
    (s, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_transformed_rotation() {
        let local = Aabb::from_center(Point3::origin(), Vec3::new(1.0, 2.0, 3.0));
        let pose = Pose::from_parts(
            nalgebra::Translation3::new(1.0, 0.0, 0.0),
            Quat::from_axis_angle(&Vec3::z_axis(), std::f64::consts::FRAC_PI_2),
        );
        let world = local.transformed(&pose);
        assert_relative_eq!(world.half_extents().x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(world.half_extents().y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(world.center().x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_entry() {
        let aabb = Aabb::from_center(Point3::origin(), Vec3::repeat(1.0));
        let t = aabb.ray_entry(&Point3::new(-5.0, 0.0, 0.0), &Vec3::x(), 100.0);
        assert_relative_eq!(t.unwrap(), 4.0);
        assert!(aabb
            .ray_entry(&Point3::new(-5.0, 3.0, 0.0), &Vec3::x(), 100.0)
            .is_none());
        assert!(aabb
            .ray_entry(&Point3::new(-5.0, 0.0, 0.0), &Vec3::x(), 3.0)
            .is_none());
    }

    #[test]
    fn test_swept_grows_only_in_motion_direction() {
        let aabb = Aabb::from_center(Point3::origin(), Vec3::repeat(1.0));
        let swept = aabb.swept(&Vec3::new(2.0, -1.0, 0.0));
        assert_eq!(swept.max.x, 3.0);
        assert_eq!(swept.min.x, -1.0);
        assert_eq!(swept.min.y, -2.0);
        assert_eq!(swept.max.y, 1.0);
    }

    #[test]
    fn test_tangent_frame_orthonormal() {
        for n in [Vec3::x(), Vec3::y(), Vec3::new(1.0, 1.0, 1.0).normalize()] {
            let (t1, t2) = tangent_frame(&n);
            assert_relative_eq!(t1.dot(&n), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t2.dot(&n), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&t2), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_closest_segment_params_crossing() {
        let (s, t) = closest_segment_params(
            &Point3::new(-1.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, -1.0, 1.0),
            &Point3::new(0.0, 1.0, 1.0),
        );
        assert_relative_eq!(s, 0.5, epsilon = 1e-12);
        assert_relative_eq!(t, 0.5, epsilon = 1e-12);
    }
}
