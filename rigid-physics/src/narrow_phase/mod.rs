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
//! Narrow-phase collision detection
//!
//! [`test_pair`] turns a candidate pair from the broad-phase into contact
//! points. Rounded pairs (sphere, capsule) and sphere/capsule against box use
//! closed forms; box against box clips faces; everything else runs GJK on the
//! shape cores and falls back to EPA when the cores overlap. Compounds are
//! split into their children.
//!
//! Conventions: normals point from shape A towards shape B, depth is positive
//! for overlap and negative for a speculative gap.

mod analytic;
mod cast;
mod clip;
mod epa;
mod gjk;

pub use cast::{RayHit, ShapeCastHit};
pub use clip::MAX_MANIFOLD_POINTS;

pub(crate) use cast::{ray_cast, shape_cast};
pub(crate) use clip::reduce_indices;

use crate::config::SimulationConfig;
use crate::error::{PhysicsError, Result};
use crate::math::{Point3, Pose, Vec3};
use crate::shape::Shape;
use analytic::RoundedCore;
use gjk::{gjk, GjkResult, PosedCore, PosedShape};

/// Tunables of the narrow-phase, taken from [`SimulationConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrowPhaseConfig {
    /// GJK iteration cap
    pub gjk_max_iterations: usize,
    /// EPA iteration cap
    pub epa_max_iterations: usize,
    /// EPA convergence tolerance
    pub epa_tolerance: f64,
    /// Gap under which separated shapes still produce contacts
    pub speculative_margin: f64,
}

impl Default for NarrowPhaseConfig {
    fn default() -> Self {
        NarrowPhaseConfig::from(&SimulationConfig::default())
    }
}

impl From<&SimulationConfig> for NarrowPhaseConfig {
    fn from(config: &SimulationConfig) -> Self {
        NarrowPhaseConfig {
            gjk_max_iterations: config.gjk_max_iterations,
            epa_max_iterations: config.epa_max_iterations,
            epa_tolerance: config.epa_tolerance,
            speculative_margin: config.speculative_margin,
        }
    }
}

/// One contact point between two shapes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifoldPoint {
    /// Point on the surface of A, world space
    pub point_a: Point3,
    /// Point on the surface of B, world space
    pub point_b: Point3,
    /// Unit normal from A towards B
    pub normal: Vec3,
    /// Signed penetration; positive means overlap
    pub depth: f64,
    /// Feature key that stays stable while the same features touch
    pub key: u32,
}

impl ManifoldPoint {
    /// Midpoint of the two surface points
    pub fn position(&self) -> Point3 {
        Point3::from((self.point_a.coords + self.point_b.coords) * 0.5)
    }

    fn flipped(mut self) -> Self {
        std::mem::swap(&mut self.point_a, &mut self.point_b);
        self.normal = -self.normal;
        self
    }
}

/// Contact points produced for one pair in one step
#[derive(Debug, Clone, PartialEq)]
pub struct Manifold {
    /// Normal of the deepest point
    pub normal: Vec3,
    /// At most [`MAX_MANIFOLD_POINTS`] points
    pub points: Vec<ManifoldPoint>,
    /// Whether the pair yields one point per step, to be accumulated across
    /// steps by the persistent manifold
    pub incremental: bool,
}

impl Manifold {
    /// Largest penetration among the points
    pub fn max_depth(&self) -> f64 {
        self.points.iter().map(|p| p.depth).fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Signed distance between two shapes with the closest features
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    /// Separation; negative when the shapes overlap
    pub distance: f64,
    /// Unit direction from A towards B
    pub normal: Vec3,
    /// Closest (or deepest) point on A
    pub point_a: Point3,
    /// Closest (or deepest) point on B
    pub point_b: Point3,
}

/// Contact points between two posed shapes
///
/// Returns `Ok(None)` when the shapes are farther apart than the speculative
/// margin.
///
/// # Errors
///
/// `DegenerateGeometry` when a pose is not finite or the iterative path
/// cannot build a valid polytope.
///
/// # Examples
///
/// ```
/// use rigid_physics::narrow_phase::{test_pair, NarrowPhaseConfig};
/// use rigid_physics::{Pose, Shape};
///
/// let ball = Shape::sphere(0.5);
/// let ground = Shape::cuboid(5.0, 0.5, 5.0);
/// let manifold = test_pair(
///     &ground,
///     &Pose::identity(),
///     &ball,
///     &Pose::translation(0.0, 0.99, 0.0),
///     &NarrowPhaseConfig::default(),
/// )
/// .unwrap()
/// .unwrap();
/// assert_eq!(manifold.points.len(), 1);
/// assert!((manifold.points[0].depth - 0.01).abs() < 1e-12);
/// ```
pub fn test_pair(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    config: &NarrowPhaseConfig,
) -> Result<Option<Manifold>> {
    check_pose(pose_a)?;
    check_pose(pose_b)?;
    let mut points = Vec::new();
    collide(shape_a, pose_a, shape_b, pose_b, config, &mut points)?;
    if points.iter().any(|p| !p.depth.is_finite() || !p.normal.iter().all(|v| v.is_finite())) {
        return Err(PhysicsError::DegenerateGeometry(format!(
            "non-finite contact between {} and {}",
            shape_a.kind_name(),
            shape_b.kind_name()
        )));
    }
    points.retain(|p| p.depth >= -config.speculative_margin);
    if points.is_empty() {
        return Ok(None);
    }
    let deepest = points
        .iter()
        .max_by(|x, y| x.depth.total_cmp(&y.depth))
        .map(|p| p.normal)
        .unwrap_or_else(Vec3::y);
    clip::reduce(&mut points, &deepest);
    Ok(Some(Manifold {
        normal: deepest,
        points,
        incremental: has_hull(shape_a) || has_hull(shape_b),
    }))
}

/// Signed distance between two shapes
///
/// Compounds report the closest pair of children.
pub fn distance(shape_a: &Shape, pose_a: &Pose, shape_b: &Shape, pose_b: &Pose, config: &NarrowPhaseConfig) -> Result<Proximity> {
    check_pose(pose_a)?;
    check_pose(pose_b)?;
    let p = closest(shape_a, pose_a, shape_b, pose_b, config)?;
    Ok(Proximity {
        distance: -p.depth,
        normal: p.normal,
        point_a: p.point_a,
        point_b: p.point_b,
    })
}

/// Whether two shapes overlap (touching counts)
pub fn intersects(shape_a: &Shape, pose_a: &Pose, shape_b: &Shape, pose_b: &Pose, config: &NarrowPhaseConfig) -> Result<bool> {
    Ok(distance(shape_a, pose_a, shape_b, pose_b, config)?.distance <= 0.0)
}

fn has_hull(shape: &Shape) -> bool {
    match shape {
        Shape::ConvexHull(_) => true,
        Shape::Compound(compound) => compound.children().iter().any(|c| has_hull(&c.shape)),
        _ => false,
    }
}

fn check_pose(pose: &Pose) -> Result<()> {
    let finite = pose.translation.vector.iter().all(|v| v.is_finite())
        && pose.rotation.coords.iter().all(|v| v.is_finite());
    if finite {
        Ok(())
    } else {
        Err(PhysicsError::DegenerateGeometry("non-finite pose".to_string()))
    }
}

fn tag_children(points: &mut [ManifoldPoint], child: usize, shift: u32) {
    let tag = ((child as u32 + 1) & 0x3f) << shift;
    for p in points {
        p.key |= tag;
    }
}

fn collide(
    a: &Shape,
    pa: &Pose,
    b: &Shape,
    pb: &Pose,
    config: &NarrowPhaseConfig,
    out: &mut Vec<ManifoldPoint>,
) -> Result<()> {
    let margin = config.speculative_margin;
    match (a, b) {
        (Shape::Compound(compound), _) => {
            let other = b.world_aabb(pb).expanded(margin);
            for (i, child) in compound.children().iter().enumerate() {
                let pose = pa * child.pose;
                if !child.shape.world_aabb(&pose).overlaps(&other) {
                    continue;
                }
                let start = out.len();
                collide(&child.shape, &pose, b, pb, config, out)?;
                tag_children(&mut out[start..], i, 20);
            }
        }
        (_, Shape::Compound(compound)) => {
            let other = a.world_aabb(pa).expanded(margin);
            for (i, child) in compound.children().iter().enumerate() {
                let pose = pb * child.pose;
                if !child.shape.world_aabb(&pose).overlaps(&other) {
                    continue;
                }
                let start = out.len();
                collide(a, pa, &child.shape, &pose, config, out)?;
                tag_children(&mut out[start..], i, 26);
            }
        }
        (Shape::Sphere { .. } | Shape::Capsule { .. }, Shape::Sphere { .. } | Shape::Capsule { .. }) => {
            let (ca, cb) = (rounded(a, pa), rounded(b, pb));
            if let (Some(ca), Some(cb)) = (ca, cb) {
                out.extend(analytic::rounded_pair(&ca, &cb, margin));
            }
        }
        (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
            let center = Point3::from(pa.translation.vector);
            out.extend(analytic::sphere_box(&center, *radius, pb, half_extents, margin).map(ManifoldPoint::flipped));
        }
        (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
            let center = Point3::from(pb.translation.vector);
            out.extend(analytic::sphere_box(&center, *radius, pa, half_extents, margin));
        }
        (Shape::Capsule { half_height, radius }, Shape::Box { half_extents }) => {
            let capsule = RoundedCore::capsule(pa, *half_height, *radius);
            capsule_box(&capsule, a, pa, b, pb, half_extents, config, true, out)?;
        }
        (Shape::Box { half_extents }, Shape::Capsule { half_height, radius }) => {
            let capsule = RoundedCore::capsule(pb, *half_height, *radius);
            capsule_box(&capsule, b, pb, a, pa, half_extents, config, false, out)?;
        }
        (Shape::Box { half_extents: ha }, Shape::Box { half_extents: hb }) => {
            let general = closest(a, pa, b, pb, config)?;
            if general.depth < -margin {
                return Ok(());
            }
            let faces = clip::box_box(pa, ha, pb, hb, &general.normal, margin);
            if faces.is_empty() {
                out.push(general);
            } else {
                out.extend(faces);
            }
        }
        _ => {
            let p = closest(a, pa, b, pb, config)?;
            if p.depth >= -margin {
                out.push(p);
            }
        }
    }
    Ok(())
}

/// Capsule end spheres against a box, plus the core contact when it is
/// deeper than both ends (a capsule crossing a box edge)
#[allow(clippy::too_many_arguments)]
fn capsule_box(
    capsule: &RoundedCore,
    capsule_shape: &Shape,
    capsule_pose: &Pose,
    box_shape: &Shape,
    box_pose: &Pose,
    half: &Vec3,
    config: &NarrowPhaseConfig,
    capsule_is_a: bool,
    out: &mut Vec<ManifoldPoint>,
) -> Result<()> {
    // Normals from the box towards the capsule
    let mut points = analytic::capsule_box_ends(capsule, box_pose, half, config.speculative_margin);
    let core = closest(box_shape, box_pose, capsule_shape, capsule_pose, config)?;
    let deeper_than_ends = points.iter().all(|p| p.depth < core.depth - 1e-6);
    if core.depth >= -config.speculative_margin && deeper_than_ends {
        points.push(ManifoldPoint { key: 3, ..core });
    }
    if capsule_is_a {
        out.extend(points.into_iter().map(ManifoldPoint::flipped));
    } else {
        out.extend(points);
    }
    Ok(())
}

fn rounded(shape: &Shape, pose: &Pose) -> Option<RoundedCore> {
    match shape {
        Shape::Sphere { radius } => Some(RoundedCore::sphere(pose, *radius)),
        Shape::Capsule { half_height, radius } => Some(RoundedCore::capsule(pose, *half_height, *radius)),
        _ => None,
    }
}

/// Single deepest (or closest) point through GJK, with EPA on overlap
fn closest(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose, config: &NarrowPhaseConfig) -> Result<ManifoldPoint> {
    if let (Shape::Compound(_), _) | (_, Shape::Compound(_)) = (a, b) {
        return closest_compound(a, pa, b, pb, config);
    }
    let (core_a, ra) = a.core();
    let (core_b, rb) = b.core();
    let sa = PosedCore { core: core_a, pose: *pa };
    let sb = PosedCore { core: core_b, pose: *pb };

    match gjk(&sa, &sb, config.gjk_max_iterations) {
        GjkResult::Separated {
            distance,
            point_a,
            point_b,
        } => {
            let normal = (point_b - point_a) / distance;
            Ok(ManifoldPoint {
                point_a: point_a + normal * ra,
                point_b: point_b - normal * rb,
                normal,
                depth: ra + rb - distance,
                key: 0,
            })
        }
        GjkResult::Overlapping(simplex) => {
            let penetration = if ra > 0.0 || rb > 0.0 {
                // The cores touch, so work on the inflated shapes
                let fa = PosedShape { shape: a, pose: *pa };
                let fb = PosedShape { shape: b, pose: *pb };
                match gjk(&fa, &fb, config.gjk_max_iterations) {
                    GjkResult::Overlapping(full) => {
                        epa::epa(&fa, &fb, &full, config.epa_max_iterations, config.epa_tolerance)
                    }
                    GjkResult::Separated { .. } => None,
                }
            } else {
                epa::epa(&sa, &sb, &simplex, config.epa_max_iterations, config.epa_tolerance)
            };
            let p = penetration.ok_or_else(|| {
                PhysicsError::DegenerateGeometry(format!(
                    "no penetration polytope for {} against {}",
                    a.kind_name(),
                    b.kind_name()
                ))
            })?;
            if !p.converged {
                log::trace!("EPA hit its iteration cap; using best estimate");
            }
            Ok(ManifoldPoint {
                point_a: p.point_a,
                point_b: p.point_b,
                normal: p.normal,
                depth: p.depth,
                key: 0,
            })
        }
    }
}

fn closest_compound(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose, config: &NarrowPhaseConfig) -> Result<ManifoldPoint> {
    let mut best: Option<ManifoldPoint> = None;
    let mut consider = |p: ManifoldPoint| {
        if best.map_or(true, |b| p.depth > b.depth) {
            best = Some(p);
        }
    };
    match (a, b) {
        (Shape::Compound(compound), _) => {
            for child in compound.children() {
                consider(closest(&child.shape, &(pa * child.pose), b, pb, config)?);
            }
        }
        (_, Shape::Compound(compound)) => {
            for child in compound.children() {
                consider(closest(a, pa, &child.shape, &(pb * child.pose), config)?);
            }
        }
        _ => consider(closest(a, pa, b, pb, config)?),
    }
    best.ok_or_else(|| PhysicsError::DegenerateGeometry("compound without children".to_string()))
}
