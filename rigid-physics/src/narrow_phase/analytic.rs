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
//! Closed-form contacts for rounded shapes and boxes
//!
//! Spheres and capsules are points and segments inflated by a radius, so the
//! contact between two of them follows from the closest points of their cores.
//! Sphere and capsule against a box reduce to clamping into the box.

use super::ManifoldPoint;
use crate::math::{closest_segment_params, normalize_or, Point3, Pose, Vec3, EPSILON};

/// Core of a rounded shape in world space: a segment, or a point when `p == q`
#[derive(Debug, Clone, Copy)]
pub(crate) struct RoundedCore {
    pub p: Point3,
    pub q: Point3,
    pub radius: f64,
}

impl RoundedCore {
    pub fn sphere(pose: &Pose, radius: f64) -> Self {
        let c = Point3::from(pose.translation.vector);
        RoundedCore { p: c, q: c, radius }
    }

    pub fn capsule(pose: &Pose, half_height: f64, radius: f64) -> Self {
        RoundedCore {
            p: pose * Point3::new(0.0, -half_height, 0.0),
            q: pose * Point3::new(0.0, half_height, 0.0),
            radius,
        }
    }

    fn axis(&self) -> Vec3 {
        self.q - self.p
    }

    fn center(&self) -> Point3 {
        Point3::from((self.p.coords + self.q.coords) * 0.5)
    }
}

/// Contact between two rounded cores
pub(crate) fn rounded_pair(a: &RoundedCore, b: &RoundedCore, margin: f64) -> Option<ManifoldPoint> {
    let (s, t) = closest_segment_params(&a.p, &a.q, &b.p, &b.q);
    let ca = a.p + a.axis() * s;
    let cb = b.p + b.axis() * t;
    let delta = cb - ca;
    let distance = delta.norm();
    let depth = a.radius + b.radius - distance;
    if depth < -margin {
        return None;
    }
    let normal = if distance > EPSILON {
        delta / distance
    } else {
        // Cores intersect: pick a direction perpendicular to both axes, facing B
        let cross = a.axis().cross(&b.axis());
        let towards = b.center() - a.center();
        let n = normalize_or(&cross, normalize_or(&towards, Vec3::y()));
        if n.dot(&towards) < 0.0 {
            -n
        } else {
            n
        }
    };
    Some(ManifoldPoint {
        point_a: ca + normal * a.radius,
        point_b: cb - normal * b.radius,
        normal,
        depth,
        key: 0,
    })
}

/// Contact between a sphere of `radius` at `center` and a box
///
/// The normal points from the box towards the sphere; `point_a` lies on the
/// box and `point_b` on the sphere.
pub(crate) fn sphere_box(center: &Point3, radius: f64, box_pose: &Pose, half: &Vec3, margin: f64) -> Option<ManifoldPoint> {
    let local = box_pose.inverse_transform_point(center);
    let clamped = Point3::new(
        local.x.clamp(-half.x, half.x),
        local.y.clamp(-half.y, half.y),
        local.z.clamp(-half.z, half.z),
    );
    let delta = local - clamped;
    let distance = delta.norm();

    let (local_normal, surface, depth) = if distance > EPSILON {
        (delta / distance, clamped, radius - distance)
    } else {
        // Center inside the box: push out through the nearest face
        let gaps = Vec3::new(half.x - local.x.abs(), half.y - local.y.abs(), half.z - local.z.abs());
        let axis = gaps.imin();
        let sign = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
        let mut n = Vec3::zeros();
        n[axis] = sign;
        let mut surface = local;
        surface[axis] = sign * half[axis];
        (n, surface, radius + gaps[axis])
    };
    if depth < -margin {
        return None;
    }
    let normal = box_pose.rotation * local_normal;
    Some(ManifoldPoint {
        point_a: box_pose * surface,
        point_b: center - normal * radius,
        normal,
        depth,
        key: 0,
    })
}

/// Contacts of a capsule's two end spheres against a box (normal box to capsule)
pub(crate) fn capsule_box_ends(capsule: &RoundedCore, box_pose: &Pose, half: &Vec3, margin: f64) -> Vec<ManifoldPoint> {
    [capsule.p, capsule.q]
        .iter()
        .enumerate()
        .filter_map(|(i, end)| {
            sphere_box(end, capsule.radius, box_pose, half, margin).map(|mut p| {
                p.key = i as u32 + 1;
                p
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_sphere() {
        let a = RoundedCore::sphere(&Pose::identity(), 1.0);
        let b = RoundedCore::sphere(&Pose::translation(1.5, 0.0, 0.0), 1.0);
        let c = rounded_pair(&a, &b, 0.0).unwrap();
        assert_relative_eq!(c.depth, 0.5, epsilon = 1e-12);
        assert_relative_eq!(c.normal, Vec3::x(), epsilon = 1e-12);
        assert_relative_eq!(c.point_a.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.point_b.x, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_speculative_margin() {
        let a = RoundedCore::sphere(&Pose::identity(), 1.0);
        let b = RoundedCore::sphere(&Pose::translation(2.01, 0.0, 0.0), 1.0);
        assert!(rounded_pair(&a, &b, 0.0).is_none());
        let c = rounded_pair(&a, &b, 0.02).unwrap();
        assert!(c.depth < 0.0);
    }

    #[test]
    fn test_crossed_capsules() {
        let a = RoundedCore::capsule(&Pose::identity(), 1.0, 0.25);
        let rot = Pose::new(Vec3::new(0.0, 0.0, 0.4), Vec3::z() * std::f64::consts::FRAC_PI_2);
        let b = RoundedCore::capsule(&rot, 1.0, 0.25);
        let c = rounded_pair(&a, &b, 0.0).unwrap();
        assert_relative_eq!(c.depth, 0.1, epsilon = 1e-9);
        assert_relative_eq!(c.normal, Vec3::z(), epsilon = 1e-9);
    }

    #[test]
    fn test_sphere_resting_on_box() {
        let half = Vec3::new(5.0, 0.5, 5.0);
        let c = sphere_box(&Point3::new(0.3, 0.99, 0.0), 0.5, &Pose::identity(), &half, 0.0).unwrap();
        assert_relative_eq!(c.normal, Vec3::y(), epsilon = 1e-12);
        assert_relative_eq!(c.depth, 0.01, epsilon = 1e-12);
        assert_relative_eq!(c.point_a.y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_center_inside_box() {
        let half = Vec3::new(1.0, 1.0, 1.0);
        let c = sphere_box(&Point3::new(0.0, 0.0, 0.8), 0.5, &Pose::identity(), &half, 0.0).unwrap();
        assert_relative_eq!(c.normal, Vec3::z(), epsilon = 1e-12);
        assert_relative_eq!(c.depth, 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_capsule_lying_on_box_gets_two_points() {
        let lying = Pose::new(Vec3::new(0.0, 0.74, 0.0), Vec3::z() * std::f64::consts::FRAC_PI_2);
        let capsule = RoundedCore::capsule(&lying, 0.5, 0.25);
        let points = capsule_box_ends(&capsule, &Pose::identity(), &Vec3::new(2.0, 0.5, 2.0), 0.0);
        assert_eq!(points.len(), 2);
        for p in points {
            assert_relative_eq!(p.depth, 0.01, epsilon = 1e-9);
        }
    }
}
