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
//! Spatial queries: ray casts, shape casts and overlap tests
//!
//! Queries read the broad-phase tree to find candidate bodies and refine
//! every candidate with the exact narrow-phase test. They never touch body
//! state and can run at any time between steps.

use crate::body::{CollisionGroups, RigidBody};
use crate::broad_phase::BroadPhase;
use crate::error::{PhysicsError, Result};
use crate::handle::{Arena, BodyHandle, LeafId};
use crate::math::{Point3, Pose, Ray, Vec3};
use crate::narrow_phase::{intersects, ray_cast, shape_cast, NarrowPhaseConfig};
use crate::shape::{Shape, ShapeRegistry};

/// Which bodies a query may report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryFilter {
    /// Body to skip, typically the one issuing the query
    pub exclude: Option<BodyHandle>,
    /// Group test applied against each body's groups
    pub groups: CollisionGroups,
    /// Whether sensor bodies are reported
    pub include_sensors: bool,
}

impl Default for QueryFilter {
    fn default() -> Self {
        QueryFilter {
            exclude: None,
            groups: CollisionGroups::ALL,
            include_sensors: false,
        }
    }
}

impl QueryFilter {
    /// Skip one body
    pub fn excluding(mut self, body: BodyHandle) -> Self {
        self.exclude = Some(body);
        self
    }

    /// Only report bodies whose groups interact with `groups`
    pub fn with_groups(mut self, groups: CollisionGroups) -> Self {
        self.groups = groups;
        self
    }

    /// Report sensor bodies as well
    pub fn with_sensors(mut self, include: bool) -> Self {
        self.include_sensors = include;
        self
    }

    fn accepts(&self, handle: BodyHandle, body: &RigidBody) -> bool {
        self.exclude != Some(handle)
            && (self.include_sensors || !body.is_sensor())
            && self.groups.interacts_with(&body.groups())
    }
}

/// Result of a ray or shape cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Body that was hit
    pub body: BodyHandle,
    /// World-space point on the body's surface
    pub point: Point3,
    /// Surface normal of the hit body at `point`
    pub normal: Vec3,
    /// Distance travelled along the cast direction
    pub distance: f64,
    /// `distance / max_distance`, zero when the query was unbounded
    pub fraction: f64,
}

/// Read-only view of the world's collision state
pub struct QueryPipeline<'a> {
    pub(crate) bodies: &'a Arena<RigidBody>,
    pub(crate) shapes: &'a ShapeRegistry,
    pub(crate) broad_phase: &'a BroadPhase,
    pub(crate) config: NarrowPhaseConfig,
}

impl<'a> QueryPipeline<'a> {
    /// Closest hit along a ray
    ///
    /// # Errors
    ///
    /// `InvalidOperation` for a zero direction or a negative or NaN
    /// `max_distance`.
    pub fn raycast(&self, origin: Point3, dir: Vec3, max_distance: f64, filter: &QueryFilter) -> Result<Option<Hit>> {
        Ok(self.ray_hits(origin, dir, max_distance, filter)?.into_iter().next())
    }

    /// Every hit along a ray, closest first
    pub fn raycast_all(&self, origin: Point3, dir: Vec3, max_distance: f64, filter: &QueryFilter) -> Result<Vec<Hit>> {
        self.ray_hits(origin, dir, max_distance, filter)
    }

    fn ray_hits(&self, origin: Point3, dir: Vec3, max_distance: f64, filter: &QueryFilter) -> Result<Vec<Hit>> {
        check_distance(max_distance)?;
        let ray = Ray::new(origin, dir)
            .ok_or_else(|| PhysicsError::InvalidOperation("ray direction must be non-zero and finite".into()))?;
        let mut hits: Vec<Hit> = self
            .broad_phase
            .query_ray(&ray.origin, &ray.dir, max_distance)
            .into_iter()
            .filter_map(|leaf| self.candidate(leaf, filter))
            .filter_map(|(handle, body, shape)| {
                let hit = ray_cast(shape, body.pose(), &ray, max_distance, &self.config)?;
                Some(Hit {
                    body: handle,
                    point: hit.point,
                    normal: hit.normal,
                    distance: hit.t,
                    fraction: fraction(hit.t, max_distance),
                })
            })
            .collect();
        sort_hits(&mut hits);
        Ok(hits)
    }

    /// First body a shape would touch when swept along `dir`
    ///
    /// Bodies the shape already overlaps are hit at distance zero.
    ///
    /// # Errors
    ///
    /// `DegenerateGeometry` if the shape is malformed, `InvalidOperation` for
    /// a zero direction or a non-finite `max_distance`.
    pub fn shape_cast(
        &self,
        shape: &Shape,
        pose: &Pose,
        dir: Vec3,
        max_distance: f64,
        filter: &QueryFilter,
    ) -> Result<Option<Hit>> {
        shape.validate()?;
        check_distance(max_distance)?;
        if !max_distance.is_finite() {
            return Err(PhysicsError::InvalidOperation("shape casts need a finite distance".into()));
        }
        let ray = Ray::new(Point3::from(pose.translation.vector), dir)
            .ok_or_else(|| PhysicsError::InvalidOperation("cast direction must be non-zero and finite".into()))?;
        let swept = shape.world_aabb(pose).swept(&(ray.dir * max_distance));

        let mut hits = Vec::new();
        for (handle, body, target) in self
            .broad_phase
            .query_aabb(&swept)
            .into_iter()
            .filter_map(|leaf| self.candidate(leaf, filter))
        {
            match shape_cast(shape, pose, &ray.dir, max_distance, target, body.pose(), &self.config) {
                Ok(Some(hit)) => hits.push(Hit {
                    body: handle,
                    point: hit.point,
                    normal: hit.normal,
                    distance: hit.t,
                    fraction: fraction(hit.t, max_distance),
                }),
                Ok(None) => {}
                Err(e) => log::warn!("shape cast against {} skipped: {}", handle, e),
            }
        }
        sort_hits(&mut hits);
        Ok(hits.into_iter().next())
    }

    /// Bodies whose shapes intersect a posed shape, in body slot order
    pub fn overlap(&self, shape: &Shape, pose: &Pose, filter: &QueryFilter) -> Result<Vec<BodyHandle>> {
        shape.validate()?;
        let mut out = Vec::new();
        for (handle, body, target) in self
            .broad_phase
            .query_aabb(&shape.world_aabb(pose))
            .into_iter()
            .filter_map(|leaf| self.candidate(leaf, filter))
        {
            match intersects(shape, pose, target, body.pose(), &self.config) {
                Ok(true) => out.push(handle),
                Ok(false) => {}
                Err(e) => log::warn!("overlap test against {} skipped: {}", handle, e),
            }
        }
        out.sort_by_key(|h| h.index());
        Ok(out)
    }

    fn candidate(&self, leaf: LeafId, filter: &QueryFilter) -> Option<(BodyHandle, &'a RigidBody, &'a Shape)> {
        let handle = self.broad_phase.proxy(leaf).ok()?.body;
        let body = self.bodies.get(handle.raw())?;
        if !filter.accepts(handle, body) {
            return None;
        }
        let shape = self.shapes.get(body.shape()).ok()?;
        Some((handle, body, shape))
    }
}

fn check_distance(max_distance: f64) -> Result<()> {
    if max_distance.is_nan() || max_distance < 0.0 {
        return Err(PhysicsError::InvalidOperation(format!(
            "query distance must be non-negative, got {}",
            max_distance
        )));
    }
    Ok(())
}

fn fraction(distance: f64, max_distance: f64) -> f64 {
    if max_distance.is_finite() && max_distance > 0.0 {
        distance / max_distance
    } else {
        0.0
    }
}

fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.body.index().cmp(&b.body.index()))
    });
}
