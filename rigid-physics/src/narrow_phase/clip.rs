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
//! Box-box face clipping and contact reduction
//!
//! Given the separating (or penetrating) normal, the face of one box most
//! aligned with it becomes the reference face and the most anti-aligned face
//! of the other box the incident face. The incident quad is clipped against
//! the side planes of the reference face and every surviving vertex becomes a
//! contact point.

use super::ManifoldPoint;
use crate::math::{Point3, Pose, Vec3};

/// Contacts kept per manifold
pub const MAX_MANIFOLD_POINTS: usize = 4;

struct BoxFrame {
    center: Point3,
    axes: [Vec3; 3],
    half: Vec3,
}

impl BoxFrame {
    fn new(pose: &Pose, half: &Vec3) -> Self {
        let rot = pose.rotation;
        BoxFrame {
            center: Point3::from(pose.translation.vector),
            axes: [rot * Vec3::x(), rot * Vec3::y(), rot * Vec3::z()],
            half: *half,
        }
    }

    /// Face most aligned with `dir`: (axis, sign, alignment)
    fn face_towards(&self, dir: &Vec3) -> (usize, f64, f64) {
        let mut best = (0, 1.0, f64::NEG_INFINITY);
        for (i, axis) in self.axes.iter().enumerate() {
            let d = axis.dot(dir);
            if d.abs() > best.2 {
                best = (i, if d >= 0.0 { 1.0 } else { -1.0 }, d.abs());
            }
        }
        best
    }
}

fn face_id(axis: usize, sign: f64) -> u32 {
    axis as u32 * 2 + u32::from(sign > 0.0)
}

#[derive(Clone, Copy)]
struct ClipVertex {
    p: Point3,
    id: u32,
}

/// Feature id of the point where edge `s -> e` crosses clip plane `plane`
fn intersection_id(plane: u32, s: u32, e: u32) -> u32 {
    let h = s.wrapping_mul(0x9e37_79b9) ^ e.wrapping_mul(0x85eb_ca6b) ^ (plane + 1).wrapping_mul(0xc2b2_ae35);
    4 + (h >> 19) % 0x1ffb
}

/// Clip a polygon against the half-space `n . p <= offset`
fn clip(poly: &[ClipVertex], n: &Vec3, offset: f64, plane: u32) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(poly.len() + 1);
    for i in 0..poly.len() {
        let s = poly[i];
        let e = poly[(i + 1) % poly.len()];
        let ds = n.dot(&s.p.coords) - offset;
        let de = n.dot(&e.p.coords) - offset;
        if ds <= 0.0 {
            out.push(s);
        }
        if (ds <= 0.0) != (de <= 0.0) {
            let t = ds / (ds - de);
            out.push(ClipVertex {
                p: s.p + (e.p - s.p) * t,
                id: intersection_id(plane, s.id, e.id),
            });
        }
    }
    out
}

/// Face contacts between two boxes along `normal` (from A towards B)
pub(crate) fn box_box(pose_a: &Pose, half_a: &Vec3, pose_b: &Pose, half_b: &Vec3, normal: &Vec3, margin: f64) -> Vec<ManifoldPoint> {
    let a = BoxFrame::new(pose_a, half_a);
    let b = BoxFrame::new(pose_b, half_b);
    let (_, _, align_a) = a.face_towards(normal);
    let (_, _, align_b) = b.face_towards(normal);

    // Prefer A as the reference so the choice does not flicker
    let flip = align_b > align_a + 1e-3;
    let (reference, incident, ref_n) = if flip { (&b, &a, -normal) } else { (&a, &b, *normal) };

    let (ri, rs, _) = reference.face_towards(&ref_n);
    let ref_normal = reference.axes[ri] * rs;
    let ref_center = reference.center + ref_normal * reference.half[ri];

    let (ii, is, _) = incident.face_towards(&-ref_normal);
    let inc_normal = incident.axes[ii] * is;
    let inc_center = incident.center + inc_normal * incident.half[ii];
    let (u, v) = ((ii + 1) % 3, (ii + 2) % 3);
    let eu = incident.axes[u] * incident.half[u];
    let ev = incident.axes[v] * incident.half[v];
    let mut poly: Vec<ClipVertex> = [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]
        .iter()
        .enumerate()
        .map(|(id, (su, sv))| ClipVertex {
            p: inc_center + eu * *su + ev * *sv,
            id: id as u32,
        })
        .collect();

    let mut plane = 0;
    for k in [(ri + 1) % 3, (ri + 2) % 3] {
        let axis = reference.axes[k];
        let c = axis.dot(&reference.center.coords);
        for sign in [1.0, -1.0] {
            poly = clip(&poly, &(axis * sign), sign * c + reference.half[k], plane);
            plane += 1;
            if poly.is_empty() {
                return Vec::new();
            }
        }
    }

    let faces = face_id(ri, rs) | face_id(ii, is) << 3 | u32::from(flip) << 6;
    let mut points: Vec<ManifoldPoint> = poly
        .iter()
        .filter_map(|cv| {
            let separation = ref_normal.dot(&(cv.p - ref_center));
            if separation > margin {
                return None;
            }
            let on_ref = cv.p - ref_normal * separation;
            let (point_a, point_b, n) = if flip {
                (cv.p, on_ref, -ref_normal)
            } else {
                (on_ref, cv.p, ref_normal)
            };
            Some(ManifoldPoint {
                point_a,
                point_b,
                normal: n,
                depth: -separation,
                key: faces | (cv.id & 0x1fff) << 7,
            })
        })
        .collect();
    reduce(&mut points, normal);
    points
}

/// Keep at most four points, maximizing the covered area
pub(crate) fn reduce(points: &mut Vec<ManifoldPoint>, normal: &Vec3) {
    if points.len() <= MAX_MANIFOLD_POINTS {
        return;
    }
    let positions: Vec<Point3> = points.iter().map(|p| p.point_b).collect();
    let depths: Vec<f64> = points.iter().map(|p| p.depth).collect();
    let keep = reduce_indices(&positions, &depths, normal);
    *points = keep.into_iter().map(|i| points[i]).collect();
}

/// Indices of at most four points spanning the largest area
///
/// Starts from the deepest point, adds the farthest one from it, then the
/// point spanning the largest triangle, then the one adding the most area
/// outside that triangle.
pub(crate) fn reduce_indices(positions: &[Point3], depths: &[f64], normal: &Vec3) -> Vec<usize> {
    let n = positions.len();
    if n <= MAX_MANIFOLD_POINTS {
        return (0..n).collect();
    }
    let signed_area = |a: &Point3, b: &Point3, c: &Point3| (b - a).cross(&(c - a)).dot(normal);

    let i0 = argmax(n, |i| depths[i]);
    let p0 = positions[i0];
    let i1 = argmax(n, |i| (positions[i] - p0).norm_squared());
    let p1 = positions[i1];
    let i2 = argmax(n, |i| signed_area(&p0, &p1, &positions[i]).abs());
    let p2 = positions[i2];
    // Orient the triangle counter-clockwise about the normal
    let tri = if signed_area(&p0, &p1, &p2) < 0.0 { [p1, p0, p2] } else { [p0, p1, p2] };
    let i3 = argmax(n, |i| {
        if i == i0 || i == i1 || i == i2 {
            return f64::NEG_INFINITY;
        }
        let worst = (0..3)
            .map(|e| signed_area(&tri[e], &tri[(e + 1) % 3], &positions[i]))
            .fold(f64::INFINITY, f64::min);
        -worst
    });

    let mut keep = Vec::with_capacity(MAX_MANIFOLD_POINTS);
    for i in [i0, i1, i2, i3] {
        if !keep.contains(&i) {
            keep.push(i);
        }
    }
    keep
}

fn argmax(n: usize, score: impl Fn(usize) -> f64) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for i in 0..n {
        let s = score(i);
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    best
}
