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
//! Joint constraints
//!
//! A joint ties an anchor frame on one body to an anchor frame on another.
//! Frames are given in each body's local space; the x axis of body A's frame
//! is the hinge or slider axis.

use crate::error::{PhysicsError, Result};
use crate::handle::{Arena, ArenaResource, BodyHandle, JointHandle};
use crate::math::{Point3, Pose, Vec3};
use serde::{Deserialize, Serialize};

/// Number of accumulated impulse slots a joint keeps
///
/// Slots 0..3 hold the linear rows, 3..6 the angular rows and 6 the limit.
pub(crate) const JOINT_ROWS: usize = 7;

/// Joint variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointKind {
    /// Anchors coincide; rotation is free
    Point,
    /// Anchors coincide; rotation only about the frame x axis
    Hinge,
    /// Rotation locked; translation only along the frame x axis
    Slider,
    /// Anchors and orientations locked together
    Fixed,
}

/// Lower and upper bound on the free coordinate of a hinge or slider
///
/// Hinge limits are angles in radians, slider limits are distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl JointLimits {
    /// Create limits, swapping the bounds if given out of order
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            JointLimits { min, max }
        } else {
            JointLimits { min: max, max: min }
        }
    }
}

/// Parameters for creating a joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointDesc {
    /// Variant
    pub kind: JointKind,
    /// First body
    pub body_a: BodyHandle,
    /// Second body
    pub body_b: BodyHandle,
    /// Anchor frame in body A's local space
    pub frame_a: Pose,
    /// Anchor frame in body B's local space
    pub frame_b: Pose,
    /// Optional limit on the free coordinate
    pub limits: Option<JointLimits>,
}

impl JointDesc {
    /// Joint with both anchor frames at the body origins
    pub fn new(kind: JointKind, body_a: BodyHandle, body_b: BodyHandle) -> Self {
        JointDesc {
            kind,
            body_a,
            body_b,
            frame_a: Pose::identity(),
            frame_b: Pose::identity(),
            limits: None,
        }
    }

    /// Ball-and-socket joint
    pub fn point(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self::new(JointKind::Point, body_a, body_b)
    }

    /// Hinge about the frame x axis
    pub fn hinge(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self::new(JointKind::Hinge, body_a, body_b)
    }

    /// Slider along the frame x axis
    pub fn slider(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self::new(JointKind::Slider, body_a, body_b)
    }

    /// Weld
    pub fn fixed(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self::new(JointKind::Fixed, body_a, body_b)
    }

    /// Set the anchor positions, keeping the frame orientations
    pub fn with_anchors(mut self, local_a: Point3, local_b: Point3) -> Self {
        self.frame_a.translation.vector = local_a.coords;
        self.frame_b.translation.vector = local_b.coords;
        self
    }

    /// Set both anchor frames
    pub fn with_frames(mut self, frame_a: Pose, frame_b: Pose) -> Self {
        self.frame_a = frame_a;
        self.frame_b = frame_b;
        self
    }

    /// Limit the free coordinate
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.limits = Some(JointLimits::new(min, max));
        self
    }
}

/// A live joint and its accumulated impulses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    desc: JointDesc,
    pub(crate) impulses: [f64; JOINT_ROWS],
}

impl Joint {
    /// Creation parameters
    pub fn desc(&self) -> &JointDesc {
        &self.desc
    }

    /// Variant
    pub fn kind(&self) -> JointKind {
        self.desc.kind
    }

    /// The two connected bodies
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.desc.body_a, self.desc.body_b)
    }

    /// Whether the joint connects the body
    pub fn involves(&self, body: BodyHandle) -> bool {
        self.desc.body_a == body || self.desc.body_b == body
    }

    /// Accumulated linear impulse on body B from the last step
    pub fn linear_impulse(&self) -> Vec3 {
        Vec3::new(self.impulses[0], self.impulses[1], self.impulses[2])
    }
}

/// Joints in creation order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointSet {
    joints: Arena<Joint>,
    order: Vec<JointHandle>,
}

impl JointSet {
    /// Create an empty set holding at most `limit` joints
    pub fn new(limit: usize) -> Self {
        JointSet {
            joints: Arena::with_limit(ArenaResource::Joints, limit),
            order: Vec::new(),
        }
    }

    /// Add a joint; the caller has checked that both bodies exist
    pub(crate) fn insert(&mut self, desc: JointDesc) -> Result<JointHandle> {
        if desc.body_a == desc.body_b {
            return Err(PhysicsError::InvalidOperation(format!(
                "joint connects {} to itself",
                desc.body_a
            )));
        }
        let raw = self.joints.insert(Joint {
            desc,
            impulses: [0.0; JOINT_ROWS],
        })?;
        let handle = JointHandle::from_raw(raw);
        self.order.push(handle);
        Ok(handle)
    }

    /// Remove a joint
    pub(crate) fn remove(&mut self, handle: JointHandle) -> Result<Joint> {
        let joint = self
            .joints
            .remove(handle.raw())
            .ok_or_else(|| handle.invalid())?;
        self.order.retain(|h| *h != handle);
        Ok(joint)
    }

    /// Remove every joint attached to a body, returning their handles
    pub(crate) fn remove_body(&mut self, body: BodyHandle) -> Vec<JointHandle> {
        let doomed: Vec<JointHandle> = self
            .iter()
            .filter(|(_, j)| j.involves(body))
            .map(|(h, _)| h)
            .collect();
        for h in &doomed {
            self.joints.remove(h.raw());
        }
        self.order.retain(|h| !doomed.contains(h));
        doomed
    }

    /// Look up a joint
    pub fn get(&self, handle: JointHandle) -> Result<&Joint> {
        self.joints.get(handle.raw()).ok_or_else(|| handle.invalid())
    }

    pub(crate) fn get_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        self.joints.get_mut(handle.raw())
    }

    /// Joints in creation order
    pub fn iter(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.order
            .iter()
            .filter_map(move |h| self.joints.get(h.raw()).map(|j| (*h, j)))
    }

    /// Number of live joints
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Whether there are no joints
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub(crate) fn arena_mut(&mut self) -> &mut Arena<Joint> {
        &mut self.joints
    }

    /// Make every handle `previous` issued for a now-free slot unresolvable
    pub(crate) fn retire_stale_handles(&mut self, previous: &JointSet) {
        self.joints.retire_generations(&previous.joints);
    }
}
