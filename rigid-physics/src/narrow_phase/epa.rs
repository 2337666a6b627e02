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
//! Expanding polytope algorithm for penetration depth
//!
//! Starts from the GJK simplex (blown up to a tetrahedron when GJK stopped
//! early) and grows the polytope towards the boundary of the Minkowski
//! difference until the closest face stops moving. The iteration cap bounds
//! the worst case; hitting it returns the best face found so far.

use super::gjk::{minkowski_support, Simplex, SupportMap, SupportPoint};
use crate::math::{Point3, Vec3, EPSILON};

/// Penetration of two overlapping convex sets
#[derive(Debug, Clone, Copy)]
pub(crate) struct Penetration {
    /// Overlap along `normal`, never negative
    pub depth: f64,
    /// Unit direction from A towards B
    pub normal: Vec3,
    /// Deepest point of A inside B
    pub point_a: Point3,
    /// Deepest point of B inside A
    pub point_b: Point3,
    /// Whether the tolerance was met before the iteration cap
    pub converged: bool,
}

#[derive(Debug, Clone, Copy)]
struct Face {
    idx: [usize; 3],
    normal: Vec3,
    distance: f64,
}

struct Polytope {
    vertices: Vec<SupportPoint>,
    faces: Vec<Face>,
    interior: Vec3,
}

impl Polytope {
    fn add_face(&mut self, i: usize, j: usize, k: usize) {
        let (a, b, c) = (self.vertices[i].w, self.vertices[j].w, self.vertices[k].w);
        let mut idx = [i, j, k];
        let cross = (b - a).cross(&(c - a));
        let len = cross.norm();
        // Sliver faces get the direction from the interior instead
        let mut normal = if len > EPSILON * EPSILON {
            cross / len
        } else {
            let out = a - self.interior;
            if out.norm() > EPSILON {
                out.normalize()
            } else {
                Vec3::x()
            }
        };
        if normal.dot(&(a - self.interior)) < 0.0 {
            normal = -normal;
            idx.swap(1, 2);
        }
        self.faces.push(Face {
            idx,
            normal,
            distance: normal.dot(&a),
        });
    }

    fn closest_face(&self) -> Option<usize> {
        self.faces
            .iter()
            .enumerate()
            .min_by(|(_, x), (_, y)| x.distance.total_cmp(&y.distance))
            .map(|(i, _)| i)
    }
}

/// Grow a 1-3 point simplex into a tetrahedron with non-zero volume
fn build_tetrahedron<A: SupportMap, B: SupportMap>(a: &A, b: &B, simplex: &Simplex) -> Option<Vec<SupportPoint>> {
    let mut pts = simplex.points.clone();
    let axes = [Vec3::x(), Vec3::y(), Vec3::z()];

    if pts.len() == 1 {
        for axis in axes.iter().flat_map(|ax| [*ax, -*ax]) {
            let p = minkowski_support(a, b, &axis);
            if (p.w - pts[0].w).norm() > EPSILON {
                pts.push(p);
                break;
            }
        }
    }
    if pts.len() == 2 {
        let d = pts[1].w - pts[0].w;
        let least = axes
            .iter()
            .min_by(|x, y| x.dot(&d).abs().total_cmp(&y.dot(&d).abs()))
            .copied()
            .unwrap_or_else(Vec3::x);
        let mut perp = d.cross(&least).normalize();
        let rotation = nalgebra::UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(d), std::f64::consts::FRAC_PI_3);
        for _ in 0..6 {
            let p = minkowski_support(a, b, &perp);
            if (p.w - pts[0].w).cross(&d).norm() > EPSILON {
                pts.push(p);
                break;
            }
            perp = rotation * perp;
        }
    }
    if pts.len() == 3 {
        let n = (pts[1].w - pts[0].w).cross(&(pts[2].w - pts[0].w));
        for dir in [n, -n] {
            let p = minkowski_support(a, b, &dir);
            if (p.w - pts[0].w).dot(&n).abs() > EPSILON * n.norm().max(1.0) {
                pts.push(p);
                break;
            }
        }
    }
    (pts.len() == 4).then_some(pts)
}

/// Penetration depth of two overlapping sets
///
/// Returns `None` when no tetrahedron with volume can be built, which only
/// happens for flat or degenerate inputs.
pub(crate) fn epa<A: SupportMap, B: SupportMap>(
    a: &A,
    b: &B,
    simplex: &Simplex,
    max_iterations: usize,
    tolerance: f64,
) -> Option<Penetration> {
    let vertices = build_tetrahedron(a, b, simplex)?;
    let interior = vertices.iter().fold(Vec3::zeros(), |acc, p| acc + p.w) / 4.0;
    let mut poly = Polytope {
        vertices,
        faces: Vec::with_capacity(64),
        interior,
    };
    poly.add_face(0, 1, 2);
    poly.add_face(0, 3, 1);
    poly.add_face(0, 2, 3);
    poly.add_face(1, 3, 2);

    let mut converged = false;
    for _ in 0..max_iterations {
        let best = poly.closest_face()?;
        let face = poly.faces[best];
        let w = minkowski_support(a, b, &face.normal);
        if face.normal.dot(&w.w) - face.distance < tolerance {
            converged = true;
            break;
        }

        let new_index = poly.vertices.len();
        poly.vertices.push(w);

        // Remove every face the new vertex sees; keep the horizon
        let mut horizon: Vec<(usize, usize)> = Vec::new();
        let vertices = &poly.vertices;
        poly.faces.retain(|f| {
            let visible = f.normal.dot(&(w.w - vertices[f.idx[0]].w)) > EPSILON;
            if visible {
                for e in 0..3 {
                    let edge = (f.idx[e], f.idx[(e + 1) % 3]);
                    if let Some(pos) = horizon.iter().position(|&h| h == (edge.1, edge.0)) {
                        horizon.remove(pos);
                    } else {
                        horizon.push(edge);
                    }
                }
            }
            !visible
        });
        if horizon.is_empty() {
            converged = true;
            poly.vertices.pop();
            break;
        }
        for (i, j) in horizon {
            poly.add_face(i, j, new_index);
        }
    }

    let face = poly.faces[poly.closest_face()?];
    let (point_a, point_b) = witnesses(&poly.vertices, &face);
    Some(Penetration {
        depth: face.distance.max(0.0),
        normal: face.normal,
        point_a,
        point_b,
        converged,
    })
}

/// Barycentric interpolation of the source points at the origin's projection
fn witnesses(vertices: &[SupportPoint], face: &Face) -> (Point3, Point3) {
    let [i, j, k] = face.idx;
    let (a, b, c) = (vertices[i], vertices[j], vertices[k]);
    let p = face.normal * face.distance;
    let v0 = b.w - a.w;
    let v1 = c.w - a.w;
    let v2 = p - a.w;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    let (u, v, w) = if denom.abs() < EPSILON * EPSILON {
        (1.0, 0.0, 0.0)
    } else {
        let v = (d11 * d20 - d01 * d21) / denom;
        let w = (d00 * d21 - d01 * d20) / denom;
        (1.0 - v - w, v, w)
    };
    let pa = a.a.coords * u + b.a.coords * v + c.a.coords * w;
    let pb = a.b.coords * u + b.b.coords * v + c.b.coords * w;
    (Point3::from(pa), Point3::from(pb))
}
