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
//! Generational handles and the arena that issues them
//!
//! Bodies, shapes and joints are referred to by an index plus a generation
//! counter. Destroying an object bumps the generation of its slot, so a handle
//! kept past destruction never resolves again, even after the slot has been
//! handed to a new object.

use crate::error::{HandleKind, PhysicsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Untyped index + generation pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    /// Create a raw handle from its parts
    pub fn new(index: u32, generation: u32) -> Self {
        RawHandle { index, generation }
    }

    /// Slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when the handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(RawHandle);

        impl $name {
            /// Kind reported in [`PhysicsError::InvalidHandle`]
            pub const KIND: HandleKind = $kind;

            /// Create a handle from its parts
            pub fn new(index: u32, generation: u32) -> Self {
                $name(RawHandle::new(index, generation))
            }

            /// Slot index
            pub fn index(&self) -> u32 {
                self.0.index
            }

            /// Generation number
            pub fn generation(&self) -> u32 {
                self.0.generation
            }

            pub(crate) fn raw(&self) -> RawHandle {
                self.0
            }

            pub(crate) fn from_raw(raw: RawHandle) -> Self {
                $name(raw)
            }

            pub(crate) fn invalid(&self) -> PhysicsError {
                PhysicsError::invalid_handle(Self::KIND, self.0.index, self.0.generation)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}, gen: {})", $label, self.0.index, self.0.generation)
            }
        }
    };
}

typed_handle!(
    /// Handle to a rigid body owned by a [`World`](crate::World)
    BodyHandle,
    HandleKind::Body,
    "Body"
);

typed_handle!(
    /// Handle to a shape in the world's shape registry
    ShapeHandle,
    HandleKind::Shape,
    "Shape"
);

typed_handle!(
    /// Handle to a joint constraint
    JointHandle,
    HandleKind::Joint,
    "Joint"
);

typed_handle!(
    /// Handle to a broad-phase leaf
    LeafId,
    HandleKind::Leaf,
    "Leaf"
);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot<T> {
    generation: u32,
    /// Highest generation any owner of this index has handed out
    high_water: u32,
    value: Option<T>,
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Slot {
            generation: 0,
            high_water: 0,
            value: None,
        }
    }

    /// Generation the next value placed in this slot must exceed
    fn floor(&self) -> u32 {
        self.generation.max(self.high_water)
    }
}

/// Slot storage with generation-checked access
///
/// Slots are reused last-in first-out, which keeps allocation order a pure
/// function of the create/destroy sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    limit: usize,
    resource: ArenaResource,
}

/// Name of the resource an arena stores, used in capacity errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArenaResource {
    /// Rigid bodies
    Bodies,
    /// Registered shapes
    Shapes,
    /// Joint constraints
    Joints,
    /// Broad-phase leaves
    Leaves,
}

impl ArenaResource {
    fn label(self) -> &'static str {
        match self {
            ArenaResource::Bodies => "body",
            ArenaResource::Shapes => "shape",
            ArenaResource::Joints => "joint",
            ArenaResource::Leaves => "broad-phase leaf",
        }
    }
}

impl<T> Arena<T> {
    /// Create an arena that refuses insertions beyond `limit` live values
    pub fn with_limit(resource: ArenaResource, limit: usize) -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            limit,
            resource,
        }
    }

    /// Store a value and return the handle for it
    pub fn insert(&mut self, value: T) -> Result<RawHandle> {
        if self.len >= self.limit {
            return Err(PhysicsError::capacity(self.resource.label(), self.limit));
        }
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                index
            }
            None => {
                self.slots.push(Slot {
                    value: Some(value),
                    ..Slot::vacant()
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.len += 1;
        Ok(RawHandle::new(index, self.slots[index as usize].generation))
    }

    /// Remove a value, invalidating every handle to it
    pub fn remove(&mut self, handle: RawHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || slot.value.is_none() {
            return None;
        }
        let value = slot.value.take();
        slot.generation = slot.floor().wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        value
    }

    /// Whether the handle refers to a live value
    pub fn contains(&self, handle: RawHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Resolve a handle
    pub fn get(&self, handle: RawHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Resolve a handle mutably
    pub fn get_mut(&mut self, handle: RawHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no value is stored
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Generation currently stored in a slot, live or free
    pub fn slot_generation(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).map(|s| s.generation)
    }

    /// Iterate live values in slot order
    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (RawHandle::new(i as u32, slot.generation), v))
        })
    }

    /// Iterate live values mutably in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RawHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|v| (RawHandle::new(i as u32, generation), v))
        })
    }

    /// Make every handle issued by `previous` unusable in this arena
    ///
    /// Used when this arena replaces `previous` wholesale. Live slots keep
    /// their generation but remember the highest one `previous` reached, so
    /// removing them later skips past it. Free slots move strictly beyond
    /// both. Slots `previous` had and this arena lacks are appended as free.
    pub(crate) fn retire_generations(&mut self, previous: &Arena<T>) {
        while self.slots.len() < previous.slots.len() {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::vacant());
            // Appended slots go below existing free slots so that the
            // restored allocation order is unchanged.
            self.free.insert(0, index);
        }
        for (slot, old) in self.slots.iter_mut().zip(&previous.slots) {
            slot.high_water = slot.high_water.max(old.floor());
            if slot.value.is_none() {
                slot.generation = slot.floor().wrapping_add(1);
            }
        }
    }
}
