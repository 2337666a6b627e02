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
//! GJK distance between convex support mappings
//!
//! Runs on the Minkowski difference `A - B`. Each simplex vertex remembers the
//! two support points it came from, so the barycentric weights of the closest
//! point give witness points on both shapes.

use crate::math::{Point3, Pose, Vec3, EPSILON};
use crate::shape::{Core, Shape};

/// Distance below which GJK reports an overlap instead of a separation
pub(crate) const TOUCH_DISTANCE: f64 = 1e-7;

/// Anything with a support function in world space
pub(crate) trait SupportMap {
    /// Farthest point along `dir`
    fn support(&self, dir: &Vec3) -> Point3;

    /// A point inside the set, used to seed the search direction
    fn center(&self) -> Point3;
}

/// A shape core placed at a pose
pub(crate) struct PosedCore<'a> {
    pub core: Core<'a>,
    pub pose: Pose,
}

impl SupportMap for PosedCore<'_> {
    fn support(&self, dir: &Vec3) -> Point3 {
        let local = self.pose.rotation.inverse_transform_vector(dir);
        self.pose * self.core.support(&local)
    }

    fn center(&self) -> Point3 {
        Point3::from(self.pose.translation.vector)
    }
}

/// A full shape (core plus radius) placed at a pose
pub(crate) struct PosedShape<'a> {
    pub shape: &'a Shape,
    pub pose: Pose,
}

impl SupportMap for PosedShape<'_> {
    fn support(&self, dir: &Vec3) -> Point3 {
        self.shape.support_world(&self.pose, dir)
    }

    fn center(&self) -> Point3 {
        Point3::from(self.pose.translation.vector)
    }
}

/// A single point
pub(crate) struct PointSupport(pub Point3);

impl SupportMap for PointSupport {
    fn support(&self, _dir: &Vec3) -> Point3 {
        self.0
    }

    fn center(&self) -> Point3 {
        self.0
    }
}

/// Vertex of the Minkowski difference with its source points
#[derive(Debug, Clone, Copy)]
pub(crate) struct SupportPoint {
    pub w: Vec3,
    pub a: Point3,
    pub b: Point3,
}

pub(crate) fn minkowski_support<A: SupportMap, B: SupportMap>(a: &A, b: &B, dir: &Vec3) -> SupportPoint {
    let pa = a.support(dir);
    let pb = b.support(&-dir);
    SupportPoint { w: pa - pb, a: pa, b: pb }
}

/// Up to four support points with the barycentric weights of the closest point
#[derive(Debug, Clone)]
pub(crate) struct Simplex {
    pub points: Vec<SupportPoint>,
    weights: Vec<f64>,
}

impl Simplex {
    fn new(first: SupportPoint) -> Self {
        Simplex {
            points: vec![first],
            weights: vec![1.0],
        }
    }

    fn keep(&mut self, keep: &[(usize, f64)]) -> Vec3 {
        let points: Vec<SupportPoint> = keep.iter().map(|&(i, _)| self.points[i]).collect();
        self.weights = keep.iter().map(|&(_, w)| w).collect();
        self.points = points;
        self.closest()
    }

    fn closest(&self) -> Vec3 {
        self.points
            .iter()
            .zip(&self.weights)
            .fold(Vec3::zeros(), |acc, (p, w)| acc + p.w * *w)
    }

    fn witnesses(&self) -> (Point3, Point3) {
        let mut a = Vec3::zeros();
        let mut b = Vec3::zeros();
        for (p, w) in self.points.iter().zip(&self.weights) {
            a += p.a.coords * *w;
            b += p.b.coords * *w;
        }
        (Point3::from(a), Point3::from(b))
    }

    fn contains(&self, w: &Vec3) -> bool {
        self.points.iter().any(|p| (p.w - w).norm_squared() < EPSILON * EPSILON)
    }

    /// Replace the simplex with its sub-simplex closest to the origin
    fn reduce(&mut self) -> Vec3 {
        match self.points.len() {
            1 => self.keep(&[(0, 1.0)]),
            2 => {
                let keep = segment(&self.points[0].w, &self.points[1].w);
                self.keep(&keep)
            }
            3 => {
                let keep = triangle([0, 1, 2], &self.points);
                self.keep(&keep)
            }
            _ => {
                let keep = tetrahedron(&self.points);
                self.keep(&keep)
            }
        }
    }
}

fn segment(a: &Vec3, b: &Vec3) -> Vec<(usize, f64)> {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < EPSILON * EPSILON {
        return vec![(0, 1.0)];
    }
    let t = -a.dot(&ab) / len2;
    if t <= 0.0 {
        vec![(0, 1.0)]
    } else if t >= 1.0 {
        vec![(1, 1.0)]
    } else {
        vec![(0, 1.0 - t), (1, t)]
    }
}

/// Closest feature of triangle `idx` to the origin (Voronoi region walk)
fn triangle(idx: [usize; 3], pts: &[SupportPoint]) -> Vec<(usize, f64)> {
    let [ia, ib, ic] = idx;
    let (a, b, c) = (pts[ia].w, pts[ib].w, pts[ic].w);
    let ab = b - a;
    let ac = c - a;

    let d1 = ab.dot(&-a);
    let d2 = ac.dot(&-a);
    if d1 <= 0.0 && d2 <= 0.0 {
        return vec![(ia, 1.0)];
    }
    let d3 = ab.dot(&-b);
    let d4 = ac.dot(&-b);
    if d3 >= 0.0 && d4 <= d3 {
        return vec![(ib, 1.0)];
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return vec![(ia, 1.0 - v), (ib, v)];
    }
    let d5 = ab.dot(&-c);
    let d6 = ac.dot(&-c);
    if d6 >= 0.0 && d5 <= d6 {
        return vec![(ic, 1.0)];
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return vec![(ia, 1.0 - w), (ic, w)];
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return vec![(ib, 1.0 - w), (ic, w)];
    }
    let sum = va + vb + vc;
    if sum.abs() < EPSILON * EPSILON {
        // Collapsed triangle: fall back to the best edge
        let edges = [(ia, ib), (ia, ic), (ib, ic)];
        return edges
            .iter()
            .map(|&(i, j)| {
                let seg = segment(&pts[i].w, &pts[j].w);
                let mapped: Vec<(usize, f64)> = seg.iter().map(|&(k, w)| (if k == 0 { i } else { j }, w)).collect();
                let p = mapped.iter().fold(Vec3::zeros(), |acc, &(k, w)| acc + pts[k].w * w);
                (p.norm_squared(), mapped)
            })
            .min_by(|x, y| x.0.total_cmp(&y.0))
            .map(|(_, m)| m)
            .unwrap_or_else(|| vec![(ia, 1.0)]);
    }
    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    vec![(ia, 1.0 - v - w), (ib, v), (ic, w)]
}

fn tetrahedron(pts: &[SupportPoint]) -> Vec<(usize, f64)> {
    let faces = [([0, 1, 2], 3), ([0, 2, 3], 1), ([0, 3, 1], 2), ([1, 3, 2], 0)];
    let volume = (pts[1].w - pts[0].w)
        .cross(&(pts[2].w - pts[0].w))
        .dot(&(pts[3].w - pts[0].w));
    let degenerate = volume.abs() < EPSILON * EPSILON;

    let mut best: Option<(f64, Vec<(usize, f64)>)> = None;
    let mut outside_any = false;
    for (face, opposite) in faces {
        let (a, b, c) = (pts[face[0]].w, pts[face[1]].w, pts[face[2]].w);
        let n = (b - a).cross(&(c - a));
        let origin_side = (-a).dot(&n);
        let opposite_side = (pts[opposite].w - a).dot(&n);
        if !degenerate && origin_side * opposite_side >= 0.0 {
            continue;
        }
        outside_any = true;
        let keep = triangle(face, pts);
        let p = keep.iter().fold(Vec3::zeros(), |acc, &(k, w)| acc + pts[k].w * w);
        let d = p.norm_squared();
        if best.as_ref().map_or(true, |(bd, _)| d < *bd) {
            best = Some((d, keep));
        }
    }
    match best {
        Some((_, keep)) if outside_any => keep,
        // Origin enclosed: keep all four with zero distance
        _ => vec![(0, 0.25), (1, 0.25), (2, 0.25), (3, 0.25)],
    }
}

/// Outcome of a GJK run
#[derive(Debug, Clone)]
pub(crate) enum GjkResult {
    /// Closest points on each shape, at `distance > TOUCH_DISTANCE` apart
    Separated {
        distance: f64,
        point_a: Point3,
        point_b: Point3,
    },
    /// The sets intersect; the simplex seeds EPA
    Overlapping(Simplex),
}

/// Distance between two convex sets, capped at `max_iterations` refinements
///
/// When the cap is hit the best estimate so far is returned.
pub(crate) fn gjk<A: SupportMap, B: SupportMap>(a: &A, b: &B, max_iterations: usize) -> GjkResult {
    let mut dir = b.center() - a.center();
    if dir.norm_squared() < EPSILON * EPSILON {
        dir = Vec3::x();
    }
    let mut simplex = Simplex::new(minkowski_support(a, b, &-dir));
    let mut v = simplex.closest();

    for _ in 0..max_iterations {
        let v2 = v.norm_squared();
        if v2 < TOUCH_DISTANCE * TOUCH_DISTANCE {
            return GjkResult::Overlapping(simplex);
        }
        let w = minkowski_support(a, b, &-v);
        // No support point gets meaningfully closer: converged
        if v2 - v.dot(&w.w) <= 1e-10 * v2.max(1.0) || simplex.contains(&w.w) {
            break;
        }
        simplex.points.push(w);
        simplex.weights.push(0.0);
        let next = simplex.reduce();
        if simplex.points.len() == 4 {
            return GjkResult::Overlapping(simplex);
        }
        let progressed = next.norm_squared() < v2;
        v = next;
        if !progressed {
            break;
        }
    }

    let distance = v.norm();
    if distance < TOUCH_DISTANCE {
        return GjkResult::Overlapping(simplex);
    }
    let (point_a, point_b) = simplex.witnesses();
    GjkResult::Separated {
        distance,
        point_a,
        point_b,
    }
}
