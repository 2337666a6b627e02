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
//! Persistent contact manifolds
//!
//! A manifold exists for every contact-channel pair whose fat AABBs overlap.
//! It is created the first step the pair appears, refreshed every step the
//! pair persists (carrying accumulated impulses forward for warm starting) and
//! destroyed the first step the pair is no longer a candidate.
//!
//! Manifolds live in a vector in creation order, which is the order the
//! solver visits them. Two derived indices map a body pair and a single body
//! to positions in that vector; both are rebuilt whenever the vector is
//! compacted.

use crate::error::{PhysicsError, Result};
use crate::handle::BodyHandle;
use crate::math::{Point3, Pose, Vec3};
use crate::narrow_phase::{reduce_indices, Manifold, ManifoldPoint, MAX_MANIFOLD_POINTS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Distance within which a new point inherits an old point's impulses
pub const MATCH_DISTANCE: f64 = 0.02;

/// Normals must agree this closely for impulses to carry over
const MATCH_NORMAL_COS: f64 = 0.9;

/// One persistent contact point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    /// Point on A's surface, world space
    pub point_a: Point3,
    /// Point on B's surface, world space
    pub point_b: Point3,
    /// `point_a` in A's shape frame
    pub local_a: Point3,
    /// `point_b` in B's shape frame
    pub local_b: Point3,
    /// Unit normal from A towards B
    pub normal: Vec3,
    /// Signed penetration, positive when overlapping
    pub depth: f64,
    /// Feature key from the narrow-phase
    pub key: u32,
    /// Accumulated normal impulse
    pub normal_impulse: f64,
    /// Accumulated friction impulse along the two tangents of `normal`
    pub tangent_impulse: [f64; 2],
}

impl ContactPoint {
    fn from_narrow(p: &ManifoldPoint, pose_a: &Pose, pose_b: &Pose) -> Self {
        ContactPoint {
            point_a: p.point_a,
            point_b: p.point_b,
            local_a: pose_a.inverse_transform_point(&p.point_a),
            local_b: pose_b.inverse_transform_point(&p.point_b),
            normal: p.normal,
            depth: p.depth,
            key: p.key,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
        }
    }

    /// Midpoint of the two surface points
    pub fn position(&self) -> Point3 {
        Point3::from((self.point_a.coords + self.point_b.coords) * 0.5)
    }
}

/// Contact state between two bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactManifold {
    /// Body with the lower slot index
    pub body_a: BodyHandle,
    /// Body with the higher slot index
    pub body_b: BodyHandle,
    /// Normal of the deepest point
    pub normal: Vec3,
    /// Up to four points
    pub points: Vec<ContactPoint>,
    /// Combined friction coefficient
    pub friction: f64,
    /// Combined restitution coefficient
    pub restitution: f64,
    pub(crate) touching: bool,
    pub(crate) was_touching: bool,
    pub(crate) seen: bool,
}

/// Read-only digest of a manifold for event consumers and tooling
#[derive(Debug, Clone, PartialEq)]
pub struct ManifoldSummary {
    /// First body
    pub body_a: BodyHandle,
    /// Second body
    pub body_b: BodyHandle,
    /// Normal from `body_a` towards `body_b`
    pub normal: Vec3,
    /// World-space contact positions
    pub points: Vec<Point3>,
    /// Deepest penetration (negative for speculative-only contact)
    pub max_depth: f64,
    /// Sum of accumulated normal impulses
    pub total_normal_impulse: f64,
}

impl ContactManifold {
    fn new(body_a: BodyHandle, body_b: BodyHandle, friction: f64, restitution: f64) -> Self {
        ContactManifold {
            body_a,
            body_b,
            normal: Vec3::y(),
            points: Vec::with_capacity(MAX_MANIFOLD_POINTS),
            friction,
            restitution,
            touching: false,
            was_touching: false,
            seen: true,
        }
    }

    /// Whether any point is in contact (depth >= 0)
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    /// Whether the body is one of the pair
    pub fn involves(&self, body: BodyHandle) -> bool {
        self.body_a == body || self.body_b == body
    }

    /// Digest for events and queries
    pub fn summary(&self) -> ManifoldSummary {
        ManifoldSummary {
            body_a: self.body_a,
            body_b: self.body_b,
            normal: self.normal,
            points: self.points.iter().map(|p| p.position()).collect(),
            max_depth: self
                .points
                .iter()
                .map(|p| p.depth)
                .fold(f64::NEG_INFINITY, f64::max),
            total_normal_impulse: self.points.iter().map(|p| p.normal_impulse).sum(),
        }
    }

    /// Replace the points with a fresh narrow-phase result, carrying impulses
    ///
    /// A new point inherits from the old point with the same feature key, or
    /// failing that from the closest old point within [`MATCH_DISTANCE`].
    fn refresh(&mut self, fresh: Option<&Manifold>, pose_a: &Pose, pose_b: &Pose, margin: f64) {
        self.was_touching = self.touching;
        let old = std::mem::take(&mut self.points);
        let Some(fresh) = fresh else {
            self.touching = false;
            return;
        };
        let mut used = vec![false; old.len()];

        for np in &fresh.points {
            let mut cp = ContactPoint::from_narrow(np, pose_a, pose_b);
            let by_key = (np.key != 0)
                .then(|| (0..old.len()).find(|&i| !used[i] && old[i].key == np.key))
                .flatten();
            let matched = by_key.or_else(|| {
                (0..old.len())
                    .filter(|&i| !used[i] && old[i].normal.dot(&np.normal) > MATCH_NORMAL_COS)
                    .map(|i| (i, (old[i].local_a - cp.local_a).norm_squared()))
                    .filter(|&(_, d2)| d2 < MATCH_DISTANCE * MATCH_DISTANCE)
                    .min_by(|x, y| x.1.total_cmp(&y.1))
                    .map(|(i, _)| i)
            });
            if let Some(i) = matched {
                used[i] = true;
                cp.normal_impulse = old[i].normal_impulse;
                cp.tangent_impulse = old[i].tangent_impulse;
            }
            self.points.push(cp);
        }

        if fresh.incremental {
            self.keep_valid_old_points(&old, &used, &fresh.normal, pose_a, pose_b, margin);
        }

        self.normal = fresh.normal;
        self.touching = self.points.iter().any(|p| p.depth >= 0.0);
    }

    /// Re-project unmatched old points and keep the ones still in contact
    fn keep_valid_old_points(
        &mut self,
        old: &[ContactPoint],
        used: &[bool],
        normal: &Vec3,
        pose_a: &Pose,
        pose_b: &Pose,
        margin: f64,
    ) {
        for (o, _) in old.iter().zip(used).filter(|(_, u)| !**u) {
            let wa = pose_a * o.local_a;
            let wb = pose_b * o.local_b;
            let gap = wb - wa;
            let along = gap.dot(normal);
            let drift = gap - normal * along;
            let duplicate = self
                .points
                .iter()
                .any(|p| (p.local_a - o.local_a).norm() < MATCH_DISTANCE);
            if -along < -margin || drift.norm() > MATCH_DISTANCE || duplicate {
                continue;
            }
            self.points.push(ContactPoint {
                point_a: wa,
                point_b: wb,
                normal: *normal,
                depth: -along,
                ..*o
            });
        }
        if self.points.len() > MAX_MANIFOLD_POINTS {
            let positions: Vec<Point3> = self.points.iter().map(|p| p.point_b).collect();
            let depths: Vec<f64> = self.points.iter().map(|p| p.depth).collect();
            let keep = reduce_indices(&positions, &depths, normal);
            self.points = keep.into_iter().map(|i| self.points[i]).collect();
        }
    }
}

/// Creation-ordered manifold table with pair and body indices
#[derive(Debug, Clone, Default)]
pub struct ContactSet {
    manifolds: Vec<ContactManifold>,
    pair_index: HashMap<(BodyHandle, BodyHandle), usize>,
    body_index: HashMap<BodyHandle, Vec<usize>>,
    max_manifolds: usize,
}

impl ContactSet {
    /// Create an empty table holding at most `max_manifolds` manifolds
    pub fn new(max_manifolds: usize) -> Self {
        ContactSet {
            manifolds: Vec::new(),
            pair_index: HashMap::new(),
            body_index: HashMap::new(),
            max_manifolds,
        }
    }

    /// Rebuild a table from manifolds in creation order
    pub(crate) fn from_manifolds(manifolds: Vec<ContactManifold>, max_manifolds: usize) -> Self {
        let mut set = ContactSet {
            manifolds,
            pair_index: HashMap::new(),
            body_index: HashMap::new(),
            max_manifolds,
        };
        set.reindex();
        set
    }

    /// Number of live manifolds
    pub fn len(&self) -> usize {
        self.manifolds.len()
    }

    /// Whether there are no manifolds
    pub fn is_empty(&self) -> bool {
        self.manifolds.is_empty()
    }

    /// Manifolds in creation order
    pub fn iter(&self) -> impl Iterator<Item = &ContactManifold> {
        self.manifolds.iter()
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [ContactManifold] {
        &mut self.manifolds
    }

    /// Manifold of a body pair, in either order
    pub fn get(&self, a: BodyHandle, b: BodyHandle) -> Option<&ContactManifold> {
        let key = if a.index() <= b.index() { (a, b) } else { (b, a) };
        self.pair_index.get(&key).map(|&i| &self.manifolds[i])
    }

    /// Manifolds involving a body, in creation order
    pub fn of_body(&self, body: BodyHandle) -> impl Iterator<Item = &ContactManifold> {
        self.body_index
            .get(&body)
            .into_iter()
            .flatten()
            .map(move |&i| &self.manifolds[i])
    }

    /// Mark every manifold as not yet seen this step
    pub(crate) fn begin_step(&mut self) {
        for m in &mut self.manifolds {
            m.seen = false;
        }
    }

    /// Create or refresh the manifold of a candidate pair
    ///
    /// `body_a` must have the lower slot index.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if a new manifold would exceed the table limit.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn update(
        &mut self,
        body_a: BodyHandle,
        body_b: BodyHandle,
        fresh: Option<&Manifold>,
        pose_a: &Pose,
        pose_b: &Pose,
        friction: f64,
        restitution: f64,
        margin: f64,
    ) -> Result<()> {
        let index = match self.pair_index.get(&(body_a, body_b)) {
            Some(&i) => i,
            None => {
                if self.manifolds.len() >= self.max_manifolds {
                    return Err(PhysicsError::capacity("manifold", self.max_manifolds));
                }
                self.manifolds.push(ContactManifold::new(body_a, body_b, friction, restitution));
                let i = self.manifolds.len() - 1;
                self.pair_index.insert((body_a, body_b), i);
                self.body_index.entry(body_a).or_default().push(i);
                self.body_index.entry(body_b).or_default().push(i);
                i
            }
        };
        let m = &mut self.manifolds[index];
        m.seen = true;
        m.friction = friction;
        m.restitution = restitution;
        m.refresh(fresh, pose_a, pose_b, margin);
        Ok(())
    }

    /// Drop manifolds whose pair was not a candidate this step
    ///
    /// Returns the removed manifolds in creation order.
    pub(crate) fn end_step(&mut self) -> Vec<ContactManifold> {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.manifolds)
            .into_iter()
            .partition(|m| m.seen);
        self.manifolds = kept;
        if !removed.is_empty() {
            self.reindex();
        }
        removed
    }

    /// Drop every manifold involving `body`
    pub(crate) fn remove_body(&mut self, body: BodyHandle) -> Vec<ContactManifold> {
        if !self.body_index.contains_key(&body) {
            return Vec::new();
        }
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.manifolds)
            .into_iter()
            .partition(|m| m.involves(body));
        self.manifolds = kept;
        self.reindex();
        removed
    }

    fn reindex(&mut self) {
        self.pair_index.clear();
        self.body_index.clear();
        for (i, m) in self.manifolds.iter().enumerate() {
            self.pair_index.insert((m.body_a, m.body_b), i);
            self.body_index.entry(m.body_a).or_default().push(i);
            self.body_index.entry(m.body_b).or_default().push(i);
        }
    }

    /// Cloned manifolds for a snapshot
    pub(crate) fn to_vec(&self) -> Vec<ContactManifold> {
        self.manifolds.clone()
    }
}
