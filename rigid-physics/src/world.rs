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
//! World: the single owner of simulation state and the fixed-step pipeline
//!
//! # Step pipeline
//!
//! 1. Refresh broad-phase bounds of every non-static body, fattened by the
//!    margin and swept by the predicted displacement
//! 2. Collect candidate pairs, sorted by body slot
//! 3. Narrow-phase: contact pairs refresh their manifolds, overlap pairs feed
//!    the trigger tracker; manifolds whose pair vanished are destroyed
//! 4. Apply gravity, accumulated forces and damping
//! 5. Solve contacts and joints
//! 6. Integrate poses, then clamp any body whose state went non-finite
//! 7. Record contact events and clear force accumulators
//!
//! Degenerate geometry and numerical blow-ups are contained: the pair is
//! skipped or the body clamped, a warning is logged and the step report
//! records it. Handle misuse is returned to the caller.

use crate::body::{BodyDesc, RigidBody};
use crate::broad_phase::{BroadPhase, CandidatePair, PairChannel, Proxy};
use crate::config::SimulationConfig;
use crate::contact::{ContactManifold, ContactSet, ManifoldSummary};
use crate::error::{PhysicsError, Result};
use crate::events::{EventBuffer, OverlapTracker};
use crate::handle::{Arena, ArenaResource, BodyHandle, JointHandle, LeafId, ShapeHandle};
use crate::integration;
use crate::joint::{Joint, JointDesc, JointSet};
use crate::math::{Point3, Pose, Vec3};
use crate::narrow_phase::{intersects, test_pair, Manifold, NarrowPhaseConfig};
use crate::query::{Hit, QueryFilter, QueryPipeline};
use crate::shape::{Shape, ShapeRegistry};
use crate::snapshot::{self, SnapshotBlob, WorldState};
use crate::solver::{Solver, SolverParams, SolverStats};
use std::collections::HashSet;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Diagnostics of one fixed step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Step number, starting at 1
    pub step: u64,
    /// Candidate pairs from the broad-phase
    pub pairs_tested: usize,
    /// Sensor and kinematic pairs whose shapes intersect
    pub overlapping_pairs: usize,
    /// Live manifolds after the step
    pub manifolds: usize,
    /// Contact points across all manifolds
    pub contact_points: usize,
    /// Solver convergence
    pub solver: SolverStats,
    /// Pairs skipped because their geometry was degenerate
    pub degenerate_pairs: usize,
    /// Manifolds refused because the table was full
    pub capacity_refusals: usize,
    /// Bodies clamped to their last good state
    pub clamped_bodies: Vec<BodyHandle>,
    /// Contained errors, in the order they happened
    pub errors: Vec<PhysicsError>,
}

enum PairOutcome {
    Contact(Result<Option<Manifold>>),
    Overlap(Result<bool>),
    Missing,
}

/// A rigid-body simulation
///
/// # Examples
///
/// ```
/// use rigid_physics::{BodyDesc, Shape, SimulationConfig, World};
///
/// let mut world = World::new(SimulationConfig::default()).unwrap();
/// let ground = world.add_shape(Shape::cuboid(10.0, 0.5, 10.0)).unwrap();
/// let ball = world.add_shape(Shape::sphere(0.5)).unwrap();
/// world.create_body(BodyDesc::fixed(ground).at(0.0, -0.5, 0.0)).unwrap();
/// let b = world.create_body(BodyDesc::dynamic(ball).at(0.0, 2.0, 0.0)).unwrap();
///
/// let steps = world.update(1.0 / 30.0);
/// assert_eq!(steps, 2);
/// assert!(world.body(b).unwrap().position().y < 2.0);
/// ```
#[derive(Debug)]
pub struct World {
    config: SimulationConfig,
    narrow: NarrowPhaseConfig,
    shapes: ShapeRegistry,
    bodies: Arena<RigidBody>,
    broad_phase: BroadPhase,
    contacts: ContactSet,
    joints: JointSet,
    overlaps: OverlapTracker,
    solver: Solver,
    events: EventBuffer,
    kinematic_targets: Vec<BodyHandle>,
    accumulator: f64,
    step_count: u64,
    last_report: StepReport,
    warned_pairs: HashSet<(BodyHandle, BodyHandle)>,
}

impl World {
    /// Create an empty world
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration fails validation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        log::debug!(
            "creating world: dt {:.5}s, {} solver iterations",
            config.fixed_timestep,
            config.solver_iterations
        );
        Ok(World {
            narrow: NarrowPhaseConfig::from(&config),
            shapes: ShapeRegistry::new(config.max_bodies),
            bodies: Arena::with_limit(ArenaResource::Bodies, config.max_bodies),
            broad_phase: BroadPhase::new(config.aabb_margin, config.max_bodies),
            contacts: ContactSet::new(config.max_manifolds),
            joints: JointSet::new(config.max_bodies),
            overlaps: OverlapTracker::new(),
            solver: Solver::new(SolverParams::from(&config)),
            events: EventBuffer::default(),
            kinematic_targets: Vec::new(),
            accumulator: 0.0,
            step_count: 0,
            last_report: StepReport::default(),
            warned_pairs: HashSet::new(),
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Change gravity for subsequent steps
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
    }

    // ----- shapes -----

    /// Register a shape so bodies can share it
    ///
    /// # Errors
    ///
    /// `DegenerateGeometry` for malformed shapes, `CapacityExceeded` when the
    /// registry is full.
    pub fn add_shape(&mut self, shape: Shape) -> Result<ShapeHandle> {
        self.shapes.register(shape)
    }

    /// Drop the registration pin of a shape
    ///
    /// The shape stays alive while any body still references it.
    pub fn release_shape(&mut self, handle: ShapeHandle) -> Result<()> {
        self.shapes.release(handle)
    }

    /// Look up a registered shape
    pub fn shape(&self, handle: ShapeHandle) -> Result<&Shape> {
        self.shapes.get(handle)
    }

    /// Shape registry
    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    // ----- bodies -----

    /// Create a body
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if the shape is not registered, `InvalidOperation` for
    /// a non-finite pose or a non-positive mass override, `CapacityExceeded`
    /// when the body table is full.
    pub fn create_body(&mut self, desc: BodyDesc) -> Result<BodyHandle> {
        let shape = self.shapes.get(desc.shape)?;
        if !pose_is_finite(&desc.pose) {
            return Err(PhysicsError::InvalidOperation("body pose must be finite".into()));
        }
        if let Some(mass) = desc.mass_override {
            if !(mass.is_finite() && mass > 0.0) {
                return Err(PhysicsError::InvalidOperation(format!(
                    "body mass must be positive, got {}",
                    mass
                )));
            }
        }
        let mass = shape.mass_properties(desc.material.density());
        let aabb = shape.world_aabb(&desc.pose);

        let placeholder = LeafId::new(u32::MAX, 0);
        let raw = self.bodies.insert(RigidBody::new(&desc, mass, aabb, placeholder))?;
        let handle = BodyHandle::from_raw(raw);
        let proxy = Proxy {
            body: handle,
            body_type: desc.body_type,
            sensor: desc.sensor,
            groups: desc.groups,
        };
        let leaf = match self.broad_phase.insert(proxy, &aabb) {
            Ok(leaf) => leaf,
            Err(e) => {
                self.bodies.remove(raw);
                return Err(e);
            }
        };
        if let Some(body) = self.bodies.get_mut(raw) {
            body.set_leaf(leaf);
        }
        self.shapes.acquire(desc.shape)?;
        log::debug!("created {:?} body {}", desc.body_type, handle);
        Ok(handle)
    }

    /// Destroy a body with its manifolds, joints and broad-phase leaf
    ///
    /// Touching manifolds produce end events. The handle, and every copy of
    /// it, is invalid afterwards.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<()> {
        let body = self.bodies.get(handle.raw()).ok_or_else(|| handle.invalid())?;
        let (leaf, shape) = (body.leaf(), body.shape());

        let removed = self.contacts.remove_body(handle);
        self.events.record_removed(&removed);
        let joints = self.joints.remove_body(handle);
        if !joints.is_empty() {
            log::debug!("destroying {} removed {} joints", handle, joints.len());
        }
        self.overlaps.remove_body(handle, &mut self.events.overlaps);
        if let Err(e) = self.broad_phase.remove(leaf) {
            log::warn!("{} had no live broad-phase leaf: {}", handle, e);
        }
        self.bodies.remove(handle.raw());
        self.shapes.release_body_ref(shape);
        self.kinematic_targets.retain(|h| *h != handle);
        self.warned_pairs.retain(|(a, b)| *a != handle && *b != handle);
        log::debug!("destroyed body {}", handle);
        Ok(())
    }

    /// Look up a body
    pub fn body(&self, handle: BodyHandle) -> Result<&RigidBody> {
        self.bodies.get(handle.raw()).ok_or_else(|| handle.invalid())
    }

    /// Whether the handle refers to a live body
    pub fn contains_body(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle.raw())
    }

    /// Live bodies in slot order
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.iter().map(|(raw, b)| (BodyHandle::from_raw(raw), b))
    }

    /// Number of live bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody> {
        self.bodies.get_mut(handle.raw()).ok_or_else(|| handle.invalid())
    }

    fn dynamic_mut(&mut self, handle: BodyHandle, what: &str) -> Result<&mut RigidBody> {
        let body = self.body_mut(handle)?;
        if !body.is_dynamic() {
            return Err(PhysicsError::InvalidOperation(format!(
                "cannot apply {} to {:?} body {}",
                what,
                body.body_type(),
                handle
            )));
        }
        Ok(body)
    }

    /// Set the linear velocity of a dynamic or kinematic body
    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec3) -> Result<()> {
        check_vector(&velocity, "velocity")?;
        let body = self.body_mut(handle)?;
        if body.is_static() {
            return Err(PhysicsError::InvalidOperation(format!("{} is static", handle)));
        }
        body.set_linear_velocity(velocity);
        Ok(())
    }

    /// Set the angular velocity (world space) of a dynamic or kinematic body
    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) -> Result<()> {
        check_vector(&velocity, "angular velocity")?;
        let body = self.body_mut(handle)?;
        if body.is_static() {
            return Err(PhysicsError::InvalidOperation(format!("{} is static", handle)));
        }
        body.set_angular_velocity(velocity);
        Ok(())
    }

    /// Add a force through the center of mass for the next step
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec3) -> Result<()> {
        check_vector(&force, "force")?;
        self.dynamic_mut(handle, "a force")?.add_force(force);
        Ok(())
    }

    /// Add a force at a world point for the next step
    pub fn apply_force_at_point(&mut self, handle: BodyHandle, force: Vec3, point: Point3) -> Result<()> {
        check_vector(&force, "force")?;
        check_vector(&point.coords, "application point")?;
        let body = self.dynamic_mut(handle, "a force")?;
        let torque = (point - body.center_of_mass()).cross(&force);
        body.add_force(force);
        body.add_torque(torque);
        Ok(())
    }

    /// Add a torque for the next step
    pub fn apply_torque(&mut self, handle: BodyHandle, torque: Vec3) -> Result<()> {
        check_vector(&torque, "torque")?;
        self.dynamic_mut(handle, "a torque")?.add_torque(torque);
        Ok(())
    }

    /// Change a body's momentum immediately
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> Result<()> {
        check_vector(&impulse, "impulse")?;
        self.dynamic_mut(handle, "an impulse")?.apply_linear_impulse(&impulse);
        Ok(())
    }

    /// Change a body's angular momentum immediately
    pub fn apply_angular_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> Result<()> {
        check_vector(&impulse, "angular impulse")?;
        self.dynamic_mut(handle, "an angular impulse")?
            .apply_angular_impulse(&impulse);
        Ok(())
    }

    /// Drive a kinematic body so that it reaches `target` after one step
    ///
    /// The velocities are reset once that step has run.
    pub fn set_kinematic_target(&mut self, handle: BodyHandle, target: Pose) -> Result<()> {
        if !pose_is_finite(&target) {
            return Err(PhysicsError::InvalidOperation("kinematic target must be finite".into()));
        }
        let dt = self.config.fixed_timestep;
        let body = self.body_mut(handle)?;
        if !body.is_kinematic() {
            return Err(PhysicsError::InvalidOperation(format!("{} is not kinematic", handle)));
        }
        let center = body.mass_properties().local_center;
        let linear = (target * center - body.pose() * center) / dt;
        let angular = (target.rotation * body.orientation().inverse()).scaled_axis() / dt;
        body.set_linear_velocity(linear);
        body.set_angular_velocity(angular);
        if !self.kinematic_targets.contains(&handle) {
            self.kinematic_targets.push(handle);
        }
        Ok(())
    }

    /// Teleport a dynamic or kinematic body
    pub fn set_pose(&mut self, handle: BodyHandle, pose: Pose) -> Result<()> {
        if !pose_is_finite(&pose) {
            return Err(PhysicsError::InvalidOperation("body pose must be finite".into()));
        }
        let body = self.bodies.get_mut(handle.raw()).ok_or_else(|| handle.invalid())?;
        if body.is_static() {
            return Err(PhysicsError::InvalidOperation(format!("{} is static", handle)));
        }
        let shape = self.shapes.get(body.shape())?;
        let aabb = shape.world_aabb(&pose);
        body.set_pose(pose);
        body.set_aabb(aabb);
        body.mark_good();
        self.broad_phase.update(body.leaf(), &aabb)?;
        Ok(())
    }

    // ----- joints -----

    /// Connect two bodies
    pub fn create_joint(&mut self, desc: JointDesc) -> Result<JointHandle> {
        for body in [desc.body_a, desc.body_b] {
            if !self.bodies.contains(body.raw()) {
                return Err(body.invalid());
            }
        }
        let handle = self.joints.insert(desc)?;
        log::debug!("created {:?} joint {}", desc.kind, handle);
        Ok(handle)
    }

    /// Remove a joint
    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<()> {
        self.joints.remove(handle).map(|_| ())
    }

    /// Look up a joint
    pub fn joint(&self, handle: JointHandle) -> Result<&Joint> {
        self.joints.get(handle)
    }

    /// Joints in creation order
    pub fn joints(&self) -> &JointSet {
        &self.joints
    }

    // ----- stepping -----

    /// Advance by wall-clock time using the fixed-timestep accumulator
    ///
    /// Returns the number of fixed steps taken. At most
    /// `max_steps_per_update` steps run per call; time beyond that is dropped
    /// so a long stall cannot trigger a spiral of catch-up steps.
    pub fn update(&mut self, elapsed: f64) -> usize {
        if !elapsed.is_finite() || elapsed < 0.0 {
            log::warn!("ignoring invalid elapsed time {}", elapsed);
            return 0;
        }
        self.accumulator += elapsed;
        let dt = self.config.fixed_timestep;
        let mut steps = 0;
        while self.accumulator >= dt {
            if steps == self.config.max_steps_per_update {
                let dropped = self.accumulator - self.accumulator % dt;
                log::warn!("simulation fell behind, dropping {:.4}s", dropped);
                self.accumulator %= dt;
                break;
            }
            self.step();
            self.accumulator -= dt;
            steps += 1;
        }
        steps
    }

    /// Time carried over to the next `update`
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Number of fixed steps run so far
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Run exactly one fixed step
    pub fn step(&mut self) {
        let dt = self.config.fixed_timestep;
        let mut report = StepReport {
            step: self.step_count + 1,
            ..StepReport::default()
        };

        self.refresh_broad_phase(dt, &mut report);

        let pairs = self.broad_phase.query_pairs();
        report.pairs_tested = pairs.len();
        let outcomes = self.narrow_phase(&pairs);
        let removed = self.update_manifolds(&pairs, outcomes, &mut report);

        let gravity = self.config.gravity;
        for (_, body) in self.bodies.iter_mut() {
            integration::apply_forces(body, &gravity, dt);
        }

        self.solver.solve(
            &mut self.bodies,
            self.contacts.as_mut_slice(),
            &mut self.joints,
            dt,
            self.config.solver_iterations,
        );
        report.solver = self.solver.stats();

        self.integrate(dt, &mut report);

        self.events.record_contacts(&self.contacts, &removed);
        for (_, body) in self.bodies.iter_mut() {
            body.clear_accumulators();
        }

        report.manifolds = self.contacts.len();
        report.contact_points = self.contacts.iter().map(|m| m.points.len()).sum();
        self.step_count += 1;
        log::trace!(
            "step {}: {} pairs, {} manifolds, {} solver iterations",
            report.step,
            report.pairs_tested,
            report.manifolds,
            report.solver.iterations_used
        );
        self.last_report = report;
    }

    /// Diagnostics of the most recent step
    pub fn last_report(&self) -> &StepReport {
        &self.last_report
    }

    /// Solver figures of the most recent step
    pub fn solver_stats(&self) -> SolverStats {
        self.solver.stats()
    }

    fn refresh_broad_phase(&mut self, dt: f64, report: &mut StepReport) {
        let scale = self.config.velocity_margin_scale;
        for (raw, body) in self.bodies.iter_mut() {
            if body.is_static() {
                continue;
            }
            let Ok(shape) = self.shapes.get(body.shape()) else {
                continue;
            };
            let aabb = shape.world_aabb(body.pose());
            body.set_aabb(aabb);
            let displacement = body.linear_velocity() * (dt * scale);
            if let Err(e) = self.broad_phase.update_predicted(body.leaf(), &aabb, &displacement) {
                log::warn!("broad-phase refresh of {} failed: {}", BodyHandle::from_raw(raw), e);
                report.errors.push(e);
            }
        }
    }

    fn test_candidate(&self, pair: &CandidatePair) -> PairOutcome {
        let lookup = |h: BodyHandle| {
            let body = self.bodies.get(h.raw())?;
            let shape = self.shapes.get(body.shape()).ok()?;
            Some((body, shape))
        };
        let (Some((a, shape_a)), Some((b, shape_b))) = (lookup(pair.body_a), lookup(pair.body_b)) else {
            return PairOutcome::Missing;
        };
        match pair.channel {
            PairChannel::Contact => PairOutcome::Contact(test_pair(shape_a, a.pose(), shape_b, b.pose(), &self.narrow)),
            PairChannel::Overlap => PairOutcome::Overlap(intersects(shape_a, a.pose(), shape_b, b.pose(), &self.narrow)),
        }
    }

    fn narrow_phase(&self, pairs: &[CandidatePair]) -> Vec<PairOutcome> {
        #[cfg(feature = "parallel")]
        if self.config.parallel_narrow_phase {
            // Indexed collect keeps the sorted pair order
            return pairs.par_iter().map(|p| self.test_candidate(p)).collect();
        }
        pairs.iter().map(|p| self.test_candidate(p)).collect()
    }

    fn update_manifolds(
        &mut self,
        pairs: &[CandidatePair],
        outcomes: Vec<PairOutcome>,
        report: &mut StepReport,
    ) -> Vec<ContactManifold> {
        let margin = self.config.speculative_margin;
        let mut overlapping = Vec::new();
        self.contacts.begin_step();

        for (pair, outcome) in pairs.iter().zip(outcomes) {
            let key = (pair.body_a, pair.body_b);
            let fresh = match outcome {
                PairOutcome::Contact(Ok(manifold)) => manifold,
                PairOutcome::Overlap(Ok(hit)) => {
                    if hit {
                        overlapping.push(key);
                    }
                    continue;
                }
                PairOutcome::Contact(Err(e)) | PairOutcome::Overlap(Err(e)) => {
                    report.degenerate_pairs += 1;
                    if self.warned_pairs.insert(key) {
                        log::warn!("skipping pair {} / {}: {}", key.0, key.1, e);
                    }
                    report.errors.push(e);
                    if pair.channel == PairChannel::Overlap {
                        continue;
                    }
                    // Keep the manifold alive without points
                    None
                }
                PairOutcome::Missing => continue,
            };

            let (Some(a), Some(b)) = (self.bodies.get(pair.body_a.raw()), self.bodies.get(pair.body_b.raw())) else {
                continue;
            };
            let friction = a.material().combined_friction(b.material());
            let restitution = a.material().combined_restitution(b.material());
            if let Err(e) = self.contacts.update(
                pair.body_a,
                pair.body_b,
                fresh.as_ref(),
                a.pose(),
                b.pose(),
                friction,
                restitution,
                margin,
            ) {
                report.capacity_refusals += 1;
                if self.warned_pairs.insert(key) {
                    log::warn!("no manifold for {} / {}: {}", key.0, key.1, e);
                }
                report.errors.push(e);
            }
        }

        report.overlapping_pairs = overlapping.len();
        self.overlaps.update(overlapping, &mut self.events.overlaps);
        self.contacts.end_step()
    }

    fn integrate(&mut self, dt: f64, report: &mut StepReport) {
        for (raw, body) in self.bodies.iter_mut() {
            if body.is_static() {
                continue;
            }
            let was_unstable = body.is_unstable();
            integration::integrate_body(body, dt);
            if integration::guard_finite(body) {
                let handle = BodyHandle::from_raw(raw);
                if !was_unstable {
                    log::warn!("{} went non-finite, clamped to last good state", handle);
                }
                report.clamped_bodies.push(handle);
                report.errors.push(PhysicsError::NumericalInstability { body: raw.index() });
            }
            if let Ok(shape) = self.shapes.get(body.shape()) {
                body.set_aabb(shape.world_aabb(body.pose()));
            }
        }
        for handle in self.kinematic_targets.drain(..) {
            if let Some(body) = self.bodies.get_mut(handle.raw()) {
                body.set_linear_velocity(Vec3::zeros());
                body.set_angular_velocity(Vec3::zeros());
            }
        }
    }

    // ----- events and contacts -----

    /// Events recorded since the last drain
    pub fn events(&self) -> &EventBuffer {
        &self.events
    }

    /// Take every pending event
    pub fn drain_events(&mut self) -> EventBuffer {
        std::mem::take(&mut self.events)
    }

    /// Live manifolds in creation order
    pub fn contacts(&self) -> &ContactSet {
        &self.contacts
    }

    /// Summaries of every manifold involving a body
    pub fn contacts_of(&self, handle: BodyHandle) -> Result<Vec<ManifoldSummary>> {
        self.body(handle)?;
        Ok(self.contacts.of_body(handle).map(|m| m.summary()).collect())
    }

    /// Currently overlapping sensor and kinematic pairs
    pub fn overlaps(&self) -> &OverlapTracker {
        &self.overlaps
    }

    // ----- queries -----

    /// Query service over the current state
    pub fn query(&self) -> QueryPipeline<'_> {
        QueryPipeline {
            bodies: &self.bodies,
            shapes: &self.shapes,
            broad_phase: &self.broad_phase,
            config: self.narrow,
        }
    }

    /// Closest body hit by a ray
    pub fn raycast(&self, origin: Point3, dir: Vec3, max_distance: f64) -> Result<Option<Hit>> {
        self.query().raycast(origin, dir, max_distance, &QueryFilter::default())
    }

    /// Every body hit by a ray, closest first
    pub fn raycast_all(&self, origin: Point3, dir: Vec3, max_distance: f64) -> Result<Vec<Hit>> {
        self.query()
            .raycast_all(origin, dir, max_distance, &QueryFilter::default())
    }

    /// First body a swept shape would touch
    pub fn shape_cast(&self, shape: &Shape, pose: &Pose, dir: Vec3, max_distance: f64) -> Result<Option<Hit>> {
        self.query()
            .shape_cast(shape, pose, dir, max_distance, &QueryFilter::default())
    }

    /// Bodies intersecting a posed shape
    pub fn overlap(&self, shape: &Shape, pose: &Pose) -> Result<Vec<BodyHandle>> {
        self.query().overlap(shape, pose, &QueryFilter::default())
    }

    /// Total kinetic energy of all dynamic bodies
    pub fn kinetic_energy(&self) -> f64 {
        integration::total_kinetic_energy(self.bodies.iter().map(|(_, b)| b))
    }

    // ----- snapshots -----

    /// Serialize the full simulation state
    pub fn capture(&self) -> Result<SnapshotBlob> {
        let mut fat_aabbs = Vec::with_capacity(self.bodies.len());
        for (raw, body) in self.bodies.iter() {
            fat_aabbs.push((BodyHandle::from_raw(raw), self.broad_phase.fat_aabb(body.leaf())?));
        }
        let state = WorldState {
            config: self.config.clone(),
            shapes: self.shapes.clone(),
            bodies: self.bodies.clone(),
            fat_aabbs,
            manifolds: self.contacts.to_vec(),
            joints: self.joints.clone(),
            overlaps: self.overlaps.clone(),
            kinematic_targets: self.kinematic_targets.clone(),
            accumulator: self.accumulator,
            step_count: self.step_count,
        };
        let blob = snapshot::encode(&state)?;
        log::debug!("captured {} bodies into {} bytes", self.bodies.len(), blob.len());
        Ok(blob)
    }

    /// Replace the simulation state with a snapshot
    ///
    /// The broad-phase tree is rebuilt from the captured bounds. Bodies,
    /// shapes and joints live in the snapshot keep their handles; every other
    /// handle issued by this world stops resolving. Nothing changes when the
    /// snapshot is rejected.
    ///
    /// # Errors
    ///
    /// `SnapshotVersionMismatch` for incompatible formats, `SnapshotCorrupt`
    /// for undecodable or inconsistent payloads.
    pub fn restore(&mut self, blob: &SnapshotBlob) -> Result<()> {
        let mut state = snapshot::decode(blob)?;
        state
            .config
            .validate()
            .map_err(|e| PhysicsError::SnapshotCorrupt(e.to_string()))?;

        state.bodies.retire_generations(&self.bodies);
        state.shapes.retire_stale_handles(&self.shapes);
        state.joints.retire_stale_handles(&self.joints);

        let mut broad_phase = BroadPhase::new(state.config.aabb_margin, state.config.max_bodies);
        for (handle, fat) in &state.fat_aabbs {
            let body = state
                .bodies
                .get_mut(handle.raw())
                .ok_or_else(|| PhysicsError::SnapshotCorrupt(format!("bounds for missing {}", handle)))?;
            let proxy = Proxy {
                body: *handle,
                body_type: body.body_type(),
                sensor: body.is_sensor(),
                groups: body.groups(),
            };
            body.set_leaf(broad_phase.insert_fat(proxy, *fat)?);
        }
        if broad_phase.len() != state.bodies.len() {
            return Err(PhysicsError::SnapshotCorrupt("bodies without broad-phase bounds".into()));
        }
        for m in &state.manifolds {
            if !state.bodies.contains(m.body_a.raw()) || !state.bodies.contains(m.body_b.raw()) {
                return Err(PhysicsError::SnapshotCorrupt(format!(
                    "manifold references missing body {} / {}",
                    m.body_a, m.body_b
                )));
            }
        }

        self.narrow = NarrowPhaseConfig::from(&state.config);
        self.solver = Solver::new(SolverParams::from(&state.config));
        self.contacts = ContactSet::from_manifolds(state.manifolds, state.config.max_manifolds);
        self.shapes = state.shapes;
        self.bodies = state.bodies;
        self.broad_phase = broad_phase;
        self.joints = state.joints;
        self.overlaps = state.overlaps;
        self.kinematic_targets = state.kinematic_targets;
        self.accumulator = state.accumulator;
        self.step_count = state.step_count;
        self.config = state.config;
        self.events.clear();
        self.warned_pairs.clear();
        self.last_report = StepReport::default();
        log::debug!("restored {} bodies at step {}", self.bodies.len(), self.step_count);
        Ok(())
    }
}

fn pose_is_finite(pose: &Pose) -> bool {
    pose.translation.vector.iter().all(|v| v.is_finite()) && pose.rotation.coords.iter().all(|v| v.is_finite())
}

fn check_vector(v: &Vec3, what: &str) -> Result<()> {
    if v.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(PhysicsError::InvalidOperation(format!("{} must be finite", what)))
    }
}
