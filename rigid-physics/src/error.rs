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
//! Error taxonomy for the physics core
//!
//! Handle misuse, snapshot version errors and capacity refusals are returned
//! to the caller. Geometry and numeric problems found inside a step are
//! contained by the [`World`](crate::World): the offending pair is skipped or
//! the offending body clamped, and the condition is logged and recorded in the
//! step report instead of failing the step.

use std::fmt;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, PhysicsError>;

/// The kind of generational handle that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// A rigid body handle
    Body,
    /// A registered shape handle
    Shape,
    /// A joint handle
    Joint,
    /// A broad-phase leaf
    Leaf,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Body => "body",
            HandleKind::Shape => "shape",
            HandleKind::Joint => "joint",
            HandleKind::Leaf => "broad-phase leaf",
        };
        f.write_str(name)
    }
}

/// Errors produced by the physics core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// A stale or out-of-range handle was used
    #[error("invalid {kind} handle (index {index}, generation {generation})")]
    InvalidHandle {
        /// What the handle refers to
        kind: HandleKind,
        /// Slot index carried by the handle
        index: u32,
        /// Generation carried by the handle
        generation: u32,
    },

    /// A shape has zero extent or is otherwise malformed
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// NaN or infinity was detected in a body's state after integration
    #[error("numerical instability detected on body slot {body}")]
    NumericalInstability {
        /// Slot index of the body that was clamped
        body: u32,
    },

    /// A snapshot was written by an incompatible format version
    #[error("snapshot version mismatch: engine reads {expected}, snapshot is {found}")]
    SnapshotVersionMismatch {
        /// Format version understood by this build
        expected: String,
        /// Format version found in the snapshot header
        found: String,
    },

    /// The snapshot buffer is not a snapshot or could not be decoded
    #[error("corrupt snapshot: {0}")]
    SnapshotCorrupt(String),

    /// A bounded table is full
    #[error("{resource} capacity of {limit} exceeded")]
    CapacityExceeded {
        /// Name of the bounded resource
        resource: &'static str,
        /// Configured upper bound
        limit: usize,
    },

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation is not valid for this body or joint
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl PhysicsError {
    /// Create an [`PhysicsError::InvalidHandle`] error
    pub fn invalid_handle(kind: HandleKind, index: u32, generation: u32) -> Self {
        PhysicsError::InvalidHandle {
            kind,
            index,
            generation,
        }
    }

    /// Create a [`PhysicsError::CapacityExceeded`] error
    pub fn capacity(resource: &'static str, limit: usize) -> Self {
        PhysicsError::CapacityExceeded { resource, limit }
    }

    /// Whether this error is contained inside a step rather than surfaced
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            PhysicsError::DegenerateGeometry(_) | PhysicsError::NumericalInstability { .. }
        )
    }
}
