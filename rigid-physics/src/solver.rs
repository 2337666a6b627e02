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
//! Sequential-impulse constraint solver
//!
//! Contacts and joints are flattened into one list of scalar velocity rows.
//! Each row has a Jacobian (linear and angular parts for both bodies), a
//! velocity target and impulse bounds. Rows are solved one at a time, in a
//! fixed order: joints in creation order, then manifolds in creation order
//! with each point's normal row followed by its two friction rows.
//!
//! Accumulated impulses are clamped rather than per-iteration deltas, so the
//! normal impulse never pulls and friction never exceeds `mu * normal`.

use crate::body::RigidBody;
use crate::config::SimulationConfig;
use crate::contact::ContactManifold;
use crate::handle::{Arena, JointHandle};
use crate::joint::{JointKind, JointSet, JOINT_ROWS};
use crate::math::{tangent_frame, Mat3, Point3, Quat, Vec3, EPSILON};
use nalgebra::SymmetricEigen;

/// Solver tuning taken from [`SimulationConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverParams {
    /// Fraction of position error fed back into the velocity target per step
    pub baumgarte_factor: f64,
    /// Penetration left uncorrected
    pub penetration_slop: f64,
    /// Approach speed below which restitution is ignored
    pub restitution_threshold: f64,
    /// Early-exit threshold on the largest impulse change of an iteration
    pub tolerance: f64,
    /// Re-apply accumulated impulses before iterating
    pub warm_starting: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams::from(&SimulationConfig::default())
    }
}

impl From<&SimulationConfig> for SolverParams {
    fn from(config: &SimulationConfig) -> Self {
        SolverParams {
            baumgarte_factor: config.baumgarte_factor,
            penetration_slop: config.penetration_slop,
            restitution_threshold: config.restitution_threshold,
            tolerance: config.solver_tolerance,
            warm_starting: config.warm_starting,
        }
    }
}

/// Convergence figures from the last [`Solver::solve`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    /// Passes actually run before the iteration cap or early exit
    pub iterations_used: usize,
    /// Largest accumulated-impulse change during the final pass
    pub max_impulse_delta: f64,
    /// Number of scalar rows solved
    pub rows: usize,
}

#[derive(Debug, Clone, Copy)]
struct SolverBody {
    v: Vec3,
    w: Vec3,
    inv_mass: f64,
    inv_inertia: Mat3,
    com: Point3,
    origin: Point3,
    rotation: Quat,
}

impl SolverBody {
    fn fixed() -> Self {
        SolverBody {
            v: Vec3::zeros(),
            w: Vec3::zeros(),
            inv_mass: 0.0,
            inv_inertia: Mat3::zeros(),
            com: Point3::origin(),
            origin: Point3::origin(),
            rotation: Quat::identity(),
        }
    }

    fn from_body(body: &RigidBody) -> Self {
        SolverBody {
            v: body.linear_velocity(),
            w: body.angular_velocity(),
            inv_mass: body.inverse_mass(),
            inv_inertia: body.inverse_inertia_world(),
            com: body.center_of_mass(),
            origin: body.position(),
            rotation: body.orientation(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Range(f64, f64),
    /// Symmetric bound scaled by the impulse of another row
    Friction { normal_row: usize, mu: f64 },
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Contact { manifold: usize, point: usize, slot: usize },
    Joint { handle: JointHandle, slot: usize },
}

#[derive(Debug, Clone, Copy)]
struct Row {
    a: usize,
    b: usize,
    lin_a: Vec3,
    ang_a: Vec3,
    lin_b: Vec3,
    ang_b: Vec3,
    inv_k: f64,
    target: f64,
    bound: Bound,
    impulse: f64,
    source: Source,
}

impl Row {
    fn velocity(&self, bodies: &[SolverBody]) -> f64 {
        let (a, b) = (&bodies[self.a], &bodies[self.b]);
        self.lin_a.dot(&a.v) + self.ang_a.dot(&a.w) + self.lin_b.dot(&b.v) + self.ang_b.dot(&b.w)
    }

    fn apply(&self, bodies: &mut [SolverBody], impulse: f64) {
        let a = &mut bodies[self.a];
        a.v += self.lin_a * (impulse * a.inv_mass);
        a.w += a.inv_inertia * self.ang_a * impulse;
        let b = &mut bodies[self.b];
        b.v += self.lin_b * (impulse * b.inv_mass);
        b.w += b.inv_inertia * self.ang_b * impulse;
    }
}

/// Scalar row builder for one body pair
struct RowBuilder<'a> {
    bodies: &'a [SolverBody],
    a: usize,
    b: usize,
}

impl RowBuilder<'_> {
    #[allow(clippy::too_many_arguments)]
    fn row(&self, lin_a: Vec3, ang_a: Vec3, lin_b: Vec3, ang_b: Vec3, target: f64, bound: Bound, source: Source) -> Option<Row> {
        let (ba, bb) = (&self.bodies[self.a], &self.bodies[self.b]);
        let k = ba.inv_mass * lin_a.norm_squared()
            + ang_a.dot(&(ba.inv_inertia * ang_a))
            + bb.inv_mass * lin_b.norm_squared()
            + ang_b.dot(&(bb.inv_inertia * ang_b));
        if k.is_nan() || k <= EPSILON {
            return None;
        }
        Some(Row {
            a: self.a,
            b: self.b,
            lin_a,
            ang_a,
            lin_b,
            ang_b,
            inv_k: 1.0 / k,
            target,
            bound,
            impulse: 0.0,
            source,
        })
    }

    /// Row driving the relative anchor velocity along `u`
    fn linear(&self, r_a: &Vec3, r_b: &Vec3, u: Vec3, target: f64, bound: Bound, source: Source) -> Option<Row> {
        self.row(-u, -r_a.cross(&u), u, r_b.cross(&u), target, bound, source)
    }

    /// Row driving the relative angular velocity about `u`
    fn angular(&self, u: Vec3, target: f64, bound: Bound, source: Source) -> Option<Row> {
        self.row(Vec3::zeros(), -u, Vec3::zeros(), u, target, bound, source)
    }
}

const FREE: Bound = Bound::Range(f64::NEG_INFINITY, f64::INFINITY);
const PUSH: Bound = Bound::Range(0.0, f64::INFINITY);

/// Sequential-impulse solver with reusable scratch buffers
#[derive(Debug, Clone, Default)]
pub struct Solver {
    params: SolverParams,
    stats: SolverStats,
    bodies: Vec<SolverBody>,
    rows: Vec<Row>,
}

impl Solver {
    /// Create a solver
    pub fn new(params: SolverParams) -> Self {
        Solver {
            params,
            ..Default::default()
        }
    }

    /// Current tuning
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Figures from the last solve
    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    /// Solve contacts and joints, updating body velocities in place
    ///
    /// Accumulated impulses are written back into the manifolds and joints so
    /// the next step can warm start from them.
    pub fn solve(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        manifolds: &mut [ContactManifold],
        joints: &mut JointSet,
        dt: f64,
        iterations: usize,
    ) {
        self.stats = SolverStats::default();
        if dt <= 0.0 {
            return;
        }
        self.load_bodies(bodies);
        self.rows.clear();
        self.prepare_joints(joints, dt);
        self.prepare_contacts(manifolds, dt);
        self.stats.rows = self.rows.len();

        if self.params.warm_starting {
            for row in &self.rows {
                row.apply(&mut self.bodies, row.impulse);
            }
        } else {
            for row in &mut self.rows {
                row.impulse = 0.0;
            }
        }

        for iteration in 0..iterations {
            let mut max_delta = 0.0_f64;
            for i in 0..self.rows.len() {
                let (lo, hi) = match self.rows[i].bound {
                    Bound::Range(lo, hi) => (lo, hi),
                    Bound::Friction { normal_row, mu } => {
                        let limit = mu * self.rows[normal_row].impulse;
                        (-limit, limit)
                    }
                };
                let row = &mut self.rows[i];
                let vel = row.velocity(&self.bodies);
                let old = row.impulse;
                row.impulse = (old + (row.target - vel) * row.inv_k).clamp(lo, hi);
                let delta = row.impulse - old;
                if delta != 0.0 {
                    row.apply(&mut self.bodies, delta);
                }
                max_delta = max_delta.max(delta.abs());
            }
            self.stats.iterations_used = iteration + 1;
            self.stats.max_impulse_delta = max_delta;
            if max_delta <= self.params.tolerance {
                break;
            }
        }

        self.store(bodies, manifolds, joints);
    }

    fn load_bodies(&mut self, bodies: &Arena<RigidBody>) {
        self.bodies.clear();
        self.bodies.resize(bodies.slot_count(), SolverBody::fixed());
        for (handle, body) in bodies.iter() {
            self.bodies[handle.index() as usize] = SolverBody::from_body(body);
        }
    }

    fn prepare_contacts(&mut self, manifolds: &[ContactManifold], dt: f64) {
        let p = self.params;
        for (mi, m) in manifolds.iter().enumerate() {
            let (a, b) = (m.body_a.index() as usize, m.body_b.index() as usize);
            if a >= self.bodies.len() || b >= self.bodies.len() {
                continue;
            }
            let builder = RowBuilder {
                bodies: &self.bodies,
                a,
                b,
            };
            let (com_a, com_b) = (self.bodies[a].com, self.bodies[b].com);
            let mut rows = Vec::with_capacity(m.points.len() * 3);
            for (pi, cp) in m.points.iter().enumerate() {
                let r_a = cp.point_a - com_a;
                let r_b = cp.point_b - com_b;
                let n = cp.normal;

                let mut target = if cp.depth < 0.0 {
                    // Speculative: allow closing the gap this step but no more
                    cp.depth / dt
                } else {
                    p.baumgarte_factor / dt * (cp.depth - p.penetration_slop).max(0.0)
                };
                let rel = relative_velocity(&builder, &r_a, &r_b);
                let approach = rel.dot(&n);
                if approach < -p.restitution_threshold && m.restitution > 0.0 && -approach * dt >= -cp.depth {
                    target = target.max(-m.restitution * approach);
                }

                let source = |slot| Source::Contact {
                    manifold: mi,
                    point: pi,
                    slot,
                };
                let Some(mut normal) = builder.linear(&r_a, &r_b, n, target, PUSH, source(0)) else {
                    continue;
                };
                normal.impulse = cp.normal_impulse;
                let normal_row = self.rows.len() + rows.len();
                rows.push(normal);

                let (t1, t2) = tangent_frame(&n);
                for (slot, t) in [(1, t1), (2, t2)] {
                    let bound = Bound::Friction {
                        normal_row,
                        mu: m.friction,
                    };
                    if let Some(mut row) = builder.linear(&r_a, &r_b, t, 0.0, bound, source(slot)) {
                        row.impulse = cp.tangent_impulse[slot - 1];
                        rows.push(row);
                    }
                }
            }
            self.rows.extend(rows);
        }
    }

    fn prepare_joints(&mut self, joints: &JointSet, dt: f64) {
        let beta = self.params.baumgarte_factor / dt;
        for (handle, joint) in joints.iter() {
            let desc = joint.desc();
            let (a, b) = (desc.body_a.index() as usize, desc.body_b.index() as usize);
            if a >= self.bodies.len() || b >= self.bodies.len() {
                continue;
            }
            let builder = RowBuilder {
                bodies: &self.bodies,
                a,
                b,
            };
            let (ba, bb) = (&self.bodies[a], &self.bodies[b]);
            let frame_rot_a = ba.rotation * desc.frame_a.rotation;
            let frame_rot_b = bb.rotation * desc.frame_b.rotation;
            let anchor_a = ba.origin + ba.rotation * desc.frame_a.translation.vector;
            let anchor_b = bb.origin + bb.rotation * desc.frame_b.translation.vector;
            let r_a = anchor_a - ba.com;
            let r_b = anchor_b - bb.com;
            let error = anchor_b - anchor_a;
            let axis = frame_rot_a * Vec3::x();

            let source = |slot| Source::Joint { handle, slot };
            // Anchor rows warm start from the world-space impulse, whatever
            // directions they are solved along this step
            let anchor_impulse = joint.linear_impulse();
            let mut rows: Vec<Row> = Vec::with_capacity(JOINT_ROWS);
            let mut push = |row: Option<Row>, slot: usize| {
                if let Some(mut row) = row {
                    row.impulse = if slot < 3 {
                        anchor_impulse.dot(&row.lin_b)
                    } else {
                        joint.impulses[slot]
                    };
                    rows.push(row);
                }
            };

            let world_axes = [Vec3::x(), Vec3::y(), Vec3::z()];
            let (u1, u2) = tangent_frame(&axis);

            // Linear part
            match desc.kind {
                JointKind::Point | JointKind::Hinge | JointKind::Fixed => {
                    // Rows along the eigenvectors of the anchor's effective
                    // mass do not disturb each other
                    let k = Mat3::identity() * (ba.inv_mass + bb.inv_mass)
                        + angular_mass(&r_a, &ba.inv_inertia)
                        + angular_mass(&r_b, &bb.inv_inertia);
                    let axes = SymmetricEigen::new(k).eigenvectors;
                    for slot in 0..3 {
                        let u: Vec3 = axes.column(slot).into_owned();
                        let c = error.dot(&u);
                        push(builder.linear(&r_a, &r_b, u, -beta * c, FREE, source(slot)), slot);
                    }
                }
                JointKind::Slider => {
                    // A's lever arm reaches B's anchor so the slide axis stays rigid
                    let r_a = anchor_b - ba.com;
                    for (slot, u) in [u1, u2].into_iter().enumerate() {
                        let c = error.dot(&u);
                        push(builder.linear(&r_a, &r_b, u, -beta * c, FREE, source(slot)), slot);
                    }
                    if let Some(limits) = desc.limits {
                        let d = error.dot(&axis);
                        if d <= limits.min {
                            push(builder.linear(&r_a, &r_b, axis, -beta * (d - limits.min), PUSH, source(6)), 6);
                        } else if d >= limits.max {
                            push(builder.linear(&r_a, &r_b, -axis, -beta * (limits.max - d), PUSH, source(6)), 6);
                        }
                    }
                }
            }

            // Angular part
            match desc.kind {
                JointKind::Point => {}
                JointKind::Hinge => {
                    let axis_b = frame_rot_b * Vec3::x();
                    let misalign = axis.cross(&axis_b);
                    for (i, u) in [u1, u2].into_iter().enumerate() {
                        push(builder.angular(u, -beta * misalign.dot(&u), FREE, source(3 + i)), 3 + i);
                    }
                    if let Some(limits) = desc.limits {
                        let ref_a = frame_rot_a * Vec3::y();
                        let ref_b = frame_rot_b * Vec3::y();
                        let angle = ref_a.cross(&ref_b).dot(&axis).atan2(ref_a.dot(&ref_b));
                        if angle <= limits.min {
                            push(builder.angular(axis, -beta * (angle - limits.min), PUSH, source(6)), 6);
                        } else if angle >= limits.max {
                            push(builder.angular(-axis, -beta * (limits.max - angle), PUSH, source(6)), 6);
                        }
                    }
                }
                JointKind::Slider | JointKind::Fixed => {
                    let theta = (frame_rot_b * frame_rot_a.inverse()).scaled_axis();
                    for (i, u) in world_axes.iter().enumerate() {
                        push(builder.angular(*u, -beta * theta.dot(u), FREE, source(3 + i)), 3 + i);
                    }
                }
            }
            self.rows.extend(rows);
        }
    }

    fn store(&self, bodies: &mut Arena<RigidBody>, manifolds: &mut [ContactManifold], joints: &mut JointSet) {
        for (_, joint) in joints.arena_mut().iter_mut() {
            joint.impulses = [0.0; JOINT_ROWS];
        }
        for row in &self.rows {
            match row.source {
                Source::Contact { manifold, point, slot } => {
                    let cp = &mut manifolds[manifold].points[point];
                    match slot {
                        0 => cp.normal_impulse = row.impulse,
                        s => cp.tangent_impulse[s - 1] = row.impulse,
                    }
                }
                Source::Joint { handle, slot } => {
                    let Some(joint) = joints.get_mut(handle) else {
                        continue;
                    };
                    if slot < 3 {
                        let p = row.lin_b * row.impulse;
                        for (stored, c) in joint.impulses[..3].iter_mut().zip(p.iter()) {
                            *stored += c;
                        }
                    } else {
                        joint.impulses[slot] = row.impulse;
                    }
                }
            }
        }
        for (handle, body) in bodies.iter_mut() {
            if body.is_dynamic() {
                let sb = &self.bodies[handle.index() as usize];
                body.set_linear_velocity(sb.v);
                body.set_angular_velocity(sb.w);
            }
        }
    }
}

/// `[r]ᵀ I⁻¹ [r]`, the angular share of a point constraint's effective mass
fn angular_mass(r: &Vec3, inv_inertia: &Mat3) -> Mat3 {
    let s = r.cross_matrix();
    s.transpose() * inv_inertia * s
}

fn relative_velocity(builder: &RowBuilder<'_>, r_a: &Vec3, r_b: &Vec3) -> Vec3 {
    let (a, b) = (&builder.bodies[builder.a], &builder.bodies[builder.b]);
    (b.v + b.w.cross(r_b)) - (a.v + a.w.cross(r_a))
}
