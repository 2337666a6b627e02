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
//! Contact and overlap events
//!
//! The world records events while it steps; the embedding engine drains them
//! and dispatches them however it likes. Nothing here calls back into user
//! code.

use crate::contact::{ContactManifold, ContactSet, ManifoldSummary};
use crate::handle::BodyHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Phase of a contact between two bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactEventKind {
    /// The bodies touched this step but not the previous one
    Begin,
    /// The bodies touched this step and the previous one
    Persist,
    /// The bodies touched the previous step but no longer do
    End,
}

/// Contact notification for one body pair
#[derive(Debug, Clone, PartialEq)]
pub struct ContactEvent {
    /// Phase
    pub kind: ContactEventKind,
    /// First body (lower slot index)
    pub body_a: BodyHandle,
    /// Second body
    pub body_b: BodyHandle,
    /// Contact digest at the time of the event
    pub manifold: ManifoldSummary,
}

/// Phase of a sensor or kinematic overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlapEventKind {
    /// The shapes started intersecting
    Begin,
    /// The shapes stopped intersecting
    End,
}

/// Overlap (trigger) notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlapEvent {
    /// Phase
    pub kind: OverlapEventKind,
    /// First body (lower slot index)
    pub body_a: BodyHandle,
    /// Second body
    pub body_b: BodyHandle,
}

/// Events recorded since the last drain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBuffer {
    /// Contact events in step order, manifold creation order within a step
    pub contacts: Vec<ContactEvent>,
    /// Overlap events in step order, body order within a step
    pub overlaps: Vec<OverlapEvent>,
}

impl EventBuffer {
    /// Whether no events are pending
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.overlaps.is_empty()
    }

    /// Forget all pending events
    pub fn clear(&mut self) {
        self.contacts.clear();
        self.overlaps.clear();
    }

    /// Record begin/persist/end events after a solve
    ///
    /// `removed` are the manifolds dropped this step; any that were touching
    /// end here.
    pub(crate) fn record_contacts(&mut self, set: &ContactSet, removed: &[ContactManifold]) {
        for m in set.iter() {
            let kind = match (m.was_touching, m.touching) {
                (false, true) => ContactEventKind::Begin,
                (true, true) => ContactEventKind::Persist,
                (true, false) => ContactEventKind::End,
                (false, false) => continue,
            };
            self.push_contact(kind, m);
        }
        self.record_removed(removed);
    }

    /// Record end events for manifolds that went away while touching
    pub(crate) fn record_removed(&mut self, removed: &[ContactManifold]) {
        for m in removed.iter().filter(|m| m.touching) {
            self.push_contact(ContactEventKind::End, m);
        }
    }

    fn push_contact(&mut self, kind: ContactEventKind, m: &ContactManifold) {
        self.contacts.push(ContactEvent {
            kind,
            body_a: m.body_a,
            body_b: m.body_b,
            manifold: m.summary(),
        });
    }
}

/// Set of overlapping sensor and kinematic pairs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapTracker {
    active: BTreeSet<(BodyHandle, BodyHandle)>,
}

impl OverlapTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active set with this step's intersecting pairs
    ///
    /// Pairs must be ordered with the lower slot index first.
    pub(crate) fn update<I>(&mut self, current: I, events: &mut Vec<OverlapEvent>)
    where
        I: IntoIterator<Item = (BodyHandle, BodyHandle)>,
    {
        let current: BTreeSet<_> = current.into_iter().collect();
        for &(body_a, body_b) in current.difference(&self.active) {
            events.push(OverlapEvent {
                kind: OverlapEventKind::Begin,
                body_a,
                body_b,
            });
        }
        for &(body_a, body_b) in self.active.difference(&current) {
            events.push(OverlapEvent {
                kind: OverlapEventKind::End,
                body_a,
                body_b,
            });
        }
        self.active = current;
    }

    /// Drop every pair involving a destroyed body, ending each one
    pub(crate) fn remove_body(&mut self, body: BodyHandle, events: &mut Vec<OverlapEvent>) {
        let gone: Vec<_> = self
            .active
            .iter()
            .filter(|(a, b)| *a == body || *b == body)
            .copied()
            .collect();
        for pair in gone {
            self.active.remove(&pair);
            events.push(OverlapEvent {
                kind: OverlapEventKind::End,
                body_a: pair.0,
                body_b: pair.1,
            });
        }
    }

    /// Whether the pair currently overlaps
    pub fn contains(&self, a: BodyHandle, b: BodyHandle) -> bool {
        let key = if a.index() <= b.index() { (a, b) } else { (b, a) };
        self.active.contains(&key)
    }

    /// Number of overlapping pairs
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether nothing overlaps
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Point3, Pose, Vec3};
    use crate::narrow_phase::{Manifold, ManifoldPoint};

    fn touching_manifold(depth: f64) -> Manifold {
        Manifold {
            normal: Vec3::y(),
            points: vec![ManifoldPoint {
                point_a: Point3::origin(),
                point_b: Point3::new(0.0, -depth, 0.0),
                normal: Vec3::y(),
                depth,
                key: 1,
            }],
            incremental: false,
        }
    }

    #[test]
    fn test_begin_persist_end_sequence() {
        let (a, b) = (BodyHandle::new(0, 0), BodyHandle::new(1, 0));
        let id = Pose::identity();
        let mut set = ContactSet::new(8);
        let mut events = EventBuffer::default();
        let mut kinds = Vec::new();

        // Speculative only, then touching twice, then separated
        for depth in [-0.01, 0.01, 0.01, -0.01] {
            set.begin_step();
            set.update(a, b, Some(&touching_manifold(depth)), &id, &id, 0.5, 0.0, 0.02)
                .unwrap();
            let removed = set.end_step();
            events.record_contacts(&set, &removed);
            kinds.extend(events.contacts.drain(..).map(|e| e.kind));
        }
        assert_eq!(
            kinds,
            vec![ContactEventKind::Begin, ContactEventKind::Persist, ContactEventKind::End]
        );
    }

    #[test]
    fn test_removed_touching_manifold_ends() {
        let (a, b) = (BodyHandle::new(0, 0), BodyHandle::new(1, 0));
        let id = Pose::identity();
        let mut set = ContactSet::new(8);
        let mut events = EventBuffer::default();
        set.update(a, b, Some(&touching_manifold(0.01)), &id, &id, 0.5, 0.0, 0.02)
            .unwrap();
        set.begin_step();
        let removed = set.end_step();
        events.record_contacts(&set, &removed);
        assert_eq!(events.contacts.len(), 1);
        assert_eq!(events.contacts[0].kind, ContactEventKind::End);
        assert_eq!(events.contacts[0].body_b, b);
    }

    #[test]
    fn test_overlap_tracker() {
        let (a, b, c) = (BodyHandle::new(0, 0), BodyHandle::new(1, 0), BodyHandle::new(2, 0));
        let mut tracker = OverlapTracker::new();
        let mut events = Vec::new();
        tracker.update([(a, b), (a, c)], &mut events);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == OverlapEventKind::Begin));
        events.clear();

        tracker.update([(a, c)], &mut events);
        assert_eq!(
            events,
            vec![OverlapEvent {
                kind: OverlapEventKind::End,
                body_a: a,
                body_b: b
            }]
        );
        assert!(tracker.contains(c, a));
        events.clear();

        tracker.remove_body(c, &mut events);
        assert_eq!(events[0].kind, OverlapEventKind::End);
        assert!(tracker.is_empty());
    }
}
