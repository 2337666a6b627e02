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
//! Ray casts and linear shape casts against single shapes
//!
//! Spheres and boxes are intersected in closed form. Capsules and hulls use
//! conservative advancement: the GJK distance to the shape bounds how far the
//! ray (or moving shape) can travel before it could touch, so stepping by that
//! bound never tunnels through.

use super::gjk::{gjk, GjkResult, PointSupport, PosedCore};
use super::{distance, NarrowPhaseConfig};
use crate::error::Result;
use crate::math::{Point3, Pose, Ray, Vec3, EPSILON};
use crate::shape::Shape;

const RAY_TOLERANCE: f64 = 1e-9;
const CAST_TOLERANCE: f64 = 1e-6;

/// Ray intersection with a single shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the ray
    pub t: f64,
    /// Outward surface normal at the hit
    pub normal: Vec3,
    /// World-space hit point
    pub point: Point3,
}

/// First contact of a moving shape with a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeCastHit {
    /// Distance travelled before contact
    pub t: f64,
    /// Target surface normal, pointing back towards the moving shape
    pub normal: Vec3,
    /// Contact point on the target
    pub point: Point3,
}

/// Intersect a ray with a posed shape within `max_t`
///
/// A ray starting inside the shape hits at `t = 0` with the normal opposing
/// the ray direction.
pub(crate) fn ray_cast(shape: &Shape, pose: &Pose, ray: &Ray, max_t: f64, config: &NarrowPhaseConfig) -> Option<RayHit> {
    let hit = match shape {
        Shape::Sphere { radius } => ray_sphere(&Point3::from(pose.translation.vector), *radius, ray)?,
        Shape::Box { half_extents } => ray_box(pose, half_extents, ray, max_t)?,
        Shape::Compound(compound) => compound
            .children()
            .iter()
            .filter_map(|child| ray_cast(&child.shape, &(pose * child.pose), ray, max_t, config))
            .min_by(|a, b| a.t.total_cmp(&b.t))?,
        _ => ray_conservative(shape, pose, ray, max_t, config.gjk_max_iterations)?,
    };
    (hit.t <= max_t).then_some(hit)
}

fn inside_hit(ray: &Ray) -> RayHit {
    RayHit {
        t: 0.0,
        normal: -ray.dir,
        point: ray.origin,
    }
}

fn ray_sphere(center: &Point3, radius: f64, ray: &Ray) -> Option<RayHit> {
    let oc = ray.origin - center;
    let b = oc.dot(&ray.dir);
    let c = oc.norm_squared() - radius * radius;
    if c <= 0.0 {
        return Some(inside_hit(ray));
    }
    if b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    let point = ray.at(t);
    Some(RayHit {
        t,
        normal: (point - center) / radius,
        point,
    })
}

fn ray_box(pose: &Pose, half: &Vec3, ray: &Ray, max_t: f64) -> Option<RayHit> {
    let o = pose.inverse_transform_point(&ray.origin);
    let d = pose.rotation.inverse_transform_vector(&ray.dir);
    let mut t_enter = f64::NEG_INFINITY;
    let mut t_exit = max_t;
    let mut normal = Vec3::zeros();
    for i in 0..3 {
        if d[i].abs() < EPSILON {
            if o[i] < -half[i] || o[i] > half[i] {
                return None;
            }
            continue;
        }
        let t0 = (-half[i] - o[i]) / d[i];
        let t1 = (half[i] - o[i]) / d[i];
        let (near, far, sign) = if d[i] > 0.0 { (t0, t1, -1.0) } else { (t1, t0, 1.0) };
        if near > t_enter {
            t_enter = near;
            normal = Vec3::zeros();
            normal[i] = sign;
        }
        t_exit = t_exit.min(far);
        if t_enter > t_exit {
            return None;
        }
    }
    if t_exit < 0.0 {
        return None;
    }
    if t_enter <= 0.0 {
        return Some(inside_hit(ray));
    }
    Some(RayHit {
        t: t_enter,
        normal: pose.rotation * normal,
        point: ray.at(t_enter),
    })
}

fn ray_conservative(shape: &Shape, pose: &Pose, ray: &Ray, max_t: f64, iterations: usize) -> Option<RayHit> {
    let (core, radius) = shape.core();
    let target = PosedCore { core, pose: *pose };
    let mut t = 0.0;
    let mut normal = -ray.dir;
    for _ in 0..iterations {
        let p = ray.at(t);
        match gjk(&PointSupport(p), &target, iterations) {
            GjkResult::Separated { distance, point_b, .. } => {
                let n = (p - point_b) / distance;
                let gap = distance - radius;
                if gap <= RAY_TOLERANCE.max(t * 1e-12) {
                    return Some(RayHit { t, normal: n, point: p });
                }
                let closing = -ray.dir.dot(&n);
                if closing <= EPSILON {
                    return None;
                }
                t += gap / closing;
                if t > max_t {
                    return None;
                }
                normal = n;
            }
            GjkResult::Overlapping(_) if t == 0.0 => return Some(inside_hit(ray)),
            GjkResult::Overlapping(_) => return Some(RayHit { t, normal, point: p }),
        }
    }
    None
}

/// Sweep `shape` from `pose` along the unit vector `dir` up to `max_t`
///
/// Shapes already overlapping at the start hit at `t = 0`. Compounds are
/// swept child by child and report the earliest hit.
pub(crate) fn shape_cast(
    shape: &Shape,
    pose: &Pose,
    dir: &Vec3,
    max_t: f64,
    target: &Shape,
    target_pose: &Pose,
    config: &NarrowPhaseConfig,
) -> Result<Option<ShapeCastHit>> {
    if let Shape::Compound(compound) = shape {
        return earliest(compound.children().iter().map(|child| {
            shape_cast(&child.shape, &(pose * child.pose), dir, max_t, target, target_pose, config)
        }));
    }
    if let Shape::Compound(compound) = target {
        return earliest(compound.children().iter().map(|child| {
            shape_cast(shape, pose, dir, max_t, &child.shape, &(target_pose * child.pose), config)
        }));
    }
    convex_cast(shape, pose, dir, max_t, target, target_pose, config)
}

fn earliest<I>(hits: I) -> Result<Option<ShapeCastHit>>
where
    I: IntoIterator<Item = Result<Option<ShapeCastHit>>>,
{
    let mut best: Option<ShapeCastHit> = None;
    for hit in hits {
        if let Some(hit) = hit? {
            if best.map_or(true, |b| hit.t < b.t) {
                best = Some(hit);
            }
        }
    }
    Ok(best)
}

fn convex_cast(
    shape: &Shape,
    pose: &Pose,
    dir: &Vec3,
    max_t: f64,
    target: &Shape,
    target_pose: &Pose,
    config: &NarrowPhaseConfig,
) -> Result<Option<ShapeCastHit>> {
    let mut t = 0.0;
    for _ in 0..config.gjk_max_iterations.max(32) {
        let mut moved = *pose;
        moved.translation.vector += dir * t;
        let p = distance(shape, &moved, target, target_pose, config)?;
        if p.distance <= CAST_TOLERANCE {
            return Ok(Some(ShapeCastHit {
                t,
                normal: -p.normal,
                point: p.point_b,
            }));
        }
        let closing = dir.dot(&p.normal);
        if closing <= EPSILON {
            return Ok(None);
        }
        t += p.distance / closing;
        if t > max_t {
            return Ok(None);
        }
    }
    Ok(None)
}
