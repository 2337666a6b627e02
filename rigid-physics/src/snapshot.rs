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
//! Versioned binary snapshots
//!
//! # Format
//!
//! ```text
//! offset  size  field
//! 0       4     magic "RBSN"
//! 4       4     format major (u32, little endian)
//! 8       4     format minor
//! 12      4     format patch
//! 16      4     flags (reserved, must be zero)
//! 20      ..    bincode payload
//! ```
//!
//! A snapshot is readable when its major version matches the engine's. For
//! `0.x` formats the minor version must match too; from `1.0` on, a snapshot
//! written by an older minor version is accepted. Anything else fails with
//! [`PhysicsError::SnapshotVersionMismatch`] before the payload is touched.

use crate::body::RigidBody;
use crate::config::SimulationConfig;
use crate::contact::ContactManifold;
use crate::error::{PhysicsError, Result};
use crate::events::OverlapTracker;
use crate::handle::{Arena, BodyHandle};
use crate::joint::JointSet;
use crate::math::Aabb;
use crate::shape::ShapeRegistry;
use semver::Version;
use serde::{Deserialize, Serialize};

/// Leading bytes of every snapshot
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"RBSN";

/// Format version written by this build
pub const FORMAT_VERSION: Version = Version::new(1, 0, 0);

const HEADER_LEN: usize = 20;

/// Opaque serialized world state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBlob(Vec<u8>);

impl SnapshotBlob {
    /// Wrap bytes read from storage
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        SnapshotBlob(bytes)
    }

    /// Borrow the encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the blob holds no bytes at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Format version recorded in the header
    pub fn version(&self) -> Result<Version> {
        read_header(&self.0).map(|(v, _)| v)
    }
}

/// Everything needed to resume a simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WorldState {
    pub config: SimulationConfig,
    pub shapes: ShapeRegistry,
    pub bodies: Arena<RigidBody>,
    /// Broad-phase fat bounds per body, in body slot order
    pub fat_aabbs: Vec<(BodyHandle, Aabb)>,
    /// Manifolds in creation order with their accumulated impulses
    pub manifolds: Vec<ContactManifold>,
    pub joints: JointSet,
    pub overlaps: OverlapTracker,
    pub kinematic_targets: Vec<BodyHandle>,
    pub accumulator: f64,
    pub step_count: u64,
}

/// Whether a snapshot written with `found` can be read by `engine`
pub fn is_compatible(found: &Version, engine: &Version) -> bool {
    if found.major != engine.major {
        return false;
    }
    if found.major != 0 {
        found.minor <= engine.minor
    } else {
        found.minor == engine.minor
    }
}

pub(crate) fn encode(state: &WorldState) -> Result<SnapshotBlob> {
    let payload = bincode::serialize(state).map_err(|e| PhysicsError::SnapshotCorrupt(e.to_string()))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&SNAPSHOT_MAGIC);
    for part in [FORMAT_VERSION.major, FORMAT_VERSION.minor, FORMAT_VERSION.patch] {
        bytes.extend_from_slice(&(part as u32).to_le_bytes());
    }
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(SnapshotBlob(bytes))
}

pub(crate) fn decode(blob: &SnapshotBlob) -> Result<WorldState> {
    let (version, flags) = read_header(&blob.0)?;
    if !is_compatible(&version, &FORMAT_VERSION) {
        return Err(PhysicsError::SnapshotVersionMismatch {
            expected: FORMAT_VERSION.to_string(),
            found: version.to_string(),
        });
    }
    if flags != 0 {
        return Err(PhysicsError::SnapshotCorrupt(format!("unknown header flags {:#x}", flags)));
    }
    bincode::deserialize(&blob.0[HEADER_LEN..]).map_err(|e| PhysicsError::SnapshotCorrupt(e.to_string()))
}

fn read_header(bytes: &[u8]) -> Result<(Version, u32)> {
    if bytes.len() < HEADER_LEN {
        return Err(PhysicsError::SnapshotCorrupt(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }
    if bytes[..4] != SNAPSHOT_MAGIC {
        return Err(PhysicsError::SnapshotCorrupt("bad magic".into()));
    }
    let word = |i: usize| {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[4 + i * 4..8 + i * 4]);
        u32::from_le_bytes(raw)
    };
    let version = Version::new(u64::from(word(0)), u64::from(word(1)), u64::from(word(2)));
    Ok((version, word(3)))
}
