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
//! Shape registry
//!
//! Shapes are stored by value in one contiguous table and shared by handle.
//! An entry lives as long as it is pinned by the registering code or
//! referenced by at least one body.

use super::Shape;
use crate::error::{PhysicsError, Result};
use crate::handle::{Arena, ArenaResource, ShapeHandle};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShapeEntry {
    shape: Shape,
    pinned: bool,
    body_refs: u32,
}

/// Table of shapes shared between bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeRegistry {
    entries: Arena<ShapeEntry>,
}

impl ShapeRegistry {
    /// Create an empty registry holding at most `limit` shapes
    pub fn new(limit: usize) -> Self {
        ShapeRegistry {
            entries: Arena::with_limit(ArenaResource::Shapes, limit),
        }
    }

    /// Validate and register a shape, pinning it until [`release`](Self::release)
    pub fn register(&mut self, shape: Shape) -> Result<ShapeHandle> {
        shape.validate()?;
        let raw = self.entries.insert(ShapeEntry {
            shape,
            pinned: true,
            body_refs: 0,
        })?;
        log::debug!("registered shape {}", ShapeHandle::from_raw(raw));
        Ok(ShapeHandle::from_raw(raw))
    }

    /// Look up a shape
    pub fn get(&self, handle: ShapeHandle) -> Result<&Shape> {
        self.entries
            .get(handle.raw())
            .map(|e| &e.shape)
            .ok_or_else(|| handle.invalid())
    }

    /// Record that a body now references the shape
    pub(crate) fn acquire(&mut self, handle: ShapeHandle) -> Result<()> {
        let entry = self
            .entries
            .get_mut(handle.raw())
            .ok_or_else(|| handle.invalid())?;
        entry.body_refs += 1;
        Ok(())
    }

    /// Record that a referencing body went away, freeing the entry when unused
    pub(crate) fn release_body_ref(&mut self, handle: ShapeHandle) {
        let free = match self.entries.get_mut(handle.raw()) {
            Some(entry) => {
                entry.body_refs = entry.body_refs.saturating_sub(1);
                !entry.pinned && entry.body_refs == 0
            }
            None => {
                log::warn!("body released unknown shape {}", handle);
                false
            }
        };
        if free {
            self.entries.remove(handle.raw());
            log::debug!("freed shape {} after last body reference", handle);
        }
    }

    /// Drop the registration pin
    ///
    /// The shape is freed immediately when no body references it; otherwise it
    /// lives until the last referencing body is destroyed. Releasing twice is an
    /// [`PhysicsError::InvalidOperation`].
    pub fn release(&mut self, handle: ShapeHandle) -> Result<()> {
        let entry = self
            .entries
            .get_mut(handle.raw())
            .ok_or_else(|| handle.invalid())?;
        if !entry.pinned {
            return Err(PhysicsError::InvalidOperation(format!(
                "{} was already released",
                handle
            )));
        }
        entry.pinned = false;
        if entry.body_refs == 0 {
            self.entries.remove(handle.raw());
        }
        Ok(())
    }

    /// Number of bodies referencing the shape
    pub fn reference_count(&self, handle: ShapeHandle) -> Result<u32> {
        self.entries
            .get(handle.raw())
            .map(|e| e.body_refs)
            .ok_or_else(|| handle.invalid())
    }

    /// Make every handle `previous` issued for a now-free slot unresolvable
    pub(crate) fn retire_stale_handles(&mut self, previous: &ShapeRegistry) {
        self.entries.retire_generations(&previous.entries);
    }

    /// Number of live shapes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_degenerate() {
        let mut registry = ShapeRegistry::new(4);
        assert!(matches!(
            registry.register(Shape::sphere(-1.0)),
            Err(PhysicsError::DegenerateGeometry(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shape_outlives_pin_while_referenced() {
        let mut registry = ShapeRegistry::new(4);
        let h = registry.register(Shape::sphere(1.0)).unwrap();
        registry.acquire(h).unwrap();
        registry.release(h).unwrap();
        assert!(registry.get(h).is_ok());

        registry.release_body_ref(h);
        assert!(matches!(
            registry.get(h),
            Err(PhysicsError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_unreferenced_release_frees_immediately() {
        let mut registry = ShapeRegistry::new(4);
        let h = registry.register(Shape::cuboid(1.0, 1.0, 1.0)).unwrap();
        registry.release(h).unwrap();
        assert!(registry.get(h).is_err());
        assert!(registry.release(h).is_err());
    }

    #[test]
    fn test_pinned_shape_survives_bodies() {
        let mut registry = ShapeRegistry::new(4);
        let h = registry.register(Shape::sphere(1.0)).unwrap();
        registry.acquire(h).unwrap();
        registry.acquire(h).unwrap();
        registry.release_body_ref(h);
        registry.release_body_ref(h);
        assert_eq!(registry.reference_count(h).unwrap(), 0);
        assert!(registry.get(h).is_ok());
    }
}
