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
//! # Rigid Physics
//!
//! A real-time rigid-body physics engine: a dynamic BVH broad-phase,
//! GJK/EPA narrow-phase with analytic shortcuts, persistent contact
//! manifolds, a sequential-impulse solver for contacts and joints, spatial
//! queries, a kinematic character controller and versioned snapshots.
//!
//! ## Features
//!
//! - **Fixed timestep**: [`World::update`] consumes wall-clock time in fixed steps
//! - **Deterministic**: identical state and inputs give identical results,
//!   with or without the parallel narrow-phase
//! - **Stable handles**: bodies, shapes and joints are addressed by
//!   generational handles that never resolve after destruction
//! - **Parallelization**: optional Rayon narrow-phase behind the `parallel` feature
//!
//! ## Example
//!
//! ```rust
//! use rigid_physics::{BodyDesc, Material, Shape, SimulationConfig, World};
//!
//! let mut world = World::new(SimulationConfig::default()).unwrap();
//! let floor = world.add_shape(Shape::cuboid(10.0, 0.5, 10.0)).unwrap();
//! let ball = world.add_shape(Shape::sphere(0.5)).unwrap();
//!
//! world.create_body(BodyDesc::fixed(floor).at(0.0, -0.5, 0.0)).unwrap();
//! let b = world
//!     .create_body(
//!         BodyDesc::dynamic(ball)
//!             .at(0.0, 3.0, 0.0)
//!             .with_material(Material::new(0.5, 0.2)),
//!     )
//!     .unwrap();
//!
//! for _ in 0..240 {
//!     world.step();
//! }
//! let y = world.body(b).unwrap().position().y;
//! assert!((y - 0.5).abs() < 0.05);
//! ```

#![warn(missing_docs)]

/// Math aliases and bounding volumes
pub mod math;

/// Error taxonomy
pub mod error;

/// Generational handles and arenas
pub mod handle;

/// Simulation configuration
pub mod config;

/// Collision shapes and mass properties
pub mod shape;

/// Rigid bodies and their materials
pub mod body;

/// Dynamic bounding-volume hierarchy
pub mod broad_phase;

/// Exact collision detection
pub mod narrow_phase;

/// Persistent contact manifolds
pub mod contact;

/// Joint constraints
pub mod joint;

/// Sequential-impulse solver
pub mod solver;

/// Semi-implicit integration and energy helpers
pub mod integration;

/// Contact and overlap events
pub mod events;

/// Ray casts, shape casts and overlaps
pub mod query;

/// Kinematic character controller
pub mod character;

/// Versioned binary snapshots
pub mod snapshot;

/// Simulation world
pub mod world;

pub use body::{BodyDesc, BodyType, CollisionGroups, Material, RigidBody};
pub use character::{CharacterConfig, CharacterController, MoveResult};
pub use config::SimulationConfig;
pub use contact::ManifoldSummary;
pub use error::{PhysicsError, Result};
pub use events::{ContactEvent, ContactEventKind, EventBuffer, OverlapEvent, OverlapEventKind};
pub use handle::{BodyHandle, JointHandle, LeafId, ShapeHandle};
pub use joint::{JointDesc, JointKind, JointLimits};
pub use math::{Aabb, Point3, Pose, Quat, Vec3};
pub use query::{Hit, QueryFilter};
pub use shape::{CompoundChild, Shape};
pub use snapshot::SnapshotBlob;
pub use world::{StepReport, World};
