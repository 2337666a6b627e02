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
//! Integration tests for snapshots and repeatability

use rigid_physics::snapshot::{SNAPSHOT_MAGIC, FORMAT_VERSION};
use rigid_physics::{
    BodyDesc, BodyHandle, JointDesc, PhysicsError, Point3, Quat, Shape, SimulationConfig, SnapshotBlob, Vec3, World,
};

/// A small pile of mixed shapes with a pendulum on the side
fn build_scene(config: SimulationConfig) -> (World, Vec<BodyHandle>) {
    let mut world = World::new(config).unwrap();
    let floor = world.add_shape(Shape::cuboid(10.0, 0.5, 10.0)).unwrap();
    let cube = world.add_shape(Shape::cuboid(0.4, 0.4, 0.4)).unwrap();
    let ball = world.add_shape(Shape::sphere(0.35)).unwrap();
    let pill = world.add_shape(Shape::capsule(0.3, 0.2)).unwrap();

    world.create_body(BodyDesc::fixed(floor).at(0.0, -0.5, 0.0)).unwrap();
    let mut dynamic = Vec::new();
    for i in 0..12 {
        let shape = [cube, ball, pill][i % 3];
        let x = (i % 4) as f64 * 0.7 - 1.0;
        let y = 1.0 + (i / 4) as f64 * 0.9;
        let tilt = Quat::from_axis_angle(&Vec3::z_axis(), 0.1 * i as f64);
        let desc = BodyDesc::dynamic(shape)
            .at(x, y, 0.05 * i as f64)
            .with_angular_velocity(tilt * Vec3::new(0.0, 0.5, 0.0));
        dynamic.push(world.create_body(desc).unwrap());
    }

    let anchor = world.create_body(BodyDesc::fixed(ball).at(4.0, 4.0, 0.0)).unwrap();
    let bob = world.create_body(BodyDesc::dynamic(ball).at(5.5, 4.0, 0.0)).unwrap();
    world
        .create_joint(JointDesc::point(anchor, bob).with_anchors(Point3::origin(), Point3::new(-1.5, 0.0, 0.0)))
        .unwrap();
    dynamic.push(bob);
    (world, dynamic)
}

fn poses(world: &World) -> Vec<(BodyHandle, [f64; 7])> {
    world
        .bodies()
        .map(|(h, b)| {
            let t = b.position();
            let q = b.orientation();
            (h, [t.x, t.y, t.z, q.i, q.j, q.k, q.w])
        })
        .collect()
}

#[test]
fn test_identical_inputs_give_identical_results() {
    let (mut first, _) = build_scene(SimulationConfig::default());
    let (mut second, _) = build_scene(SimulationConfig::default());
    for _ in 0..120 {
        first.step();
        second.step();
    }
    // Bitwise equality, not approximate
    assert_eq!(poses(&first), poses(&second));
    assert_eq!(first.capture().unwrap(), second.capture().unwrap());
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_narrow_phase_matches_serial() {
    let serial = SimulationConfig {
        parallel_narrow_phase: false,
        ..SimulationConfig::default()
    };
    let parallel = SimulationConfig {
        parallel_narrow_phase: true,
        ..SimulationConfig::default()
    };
    let (mut a, _) = build_scene(serial);
    let (mut b, _) = build_scene(parallel);
    for _ in 0..90 {
        a.step();
        b.step();
    }
    assert_eq!(poses(&a), poses(&b));
}

#[test]
fn test_restore_reproduces_trajectory() {
    let (mut world, _) = build_scene(SimulationConfig::default());
    for _ in 0..30 {
        world.step();
    }
    let blob = world.capture().unwrap();
    for _ in 0..60 {
        world.step();
    }
    let expected = poses(&world);

    let (mut other, _) = build_scene(SimulationConfig::default().with_solver_iterations(3));
    other.restore(&blob).unwrap();
    assert_eq!(other.config().solver_iterations, 8);
    for _ in 0..60 {
        other.step();
    }
    assert_eq!(poses(&other), expected);
    assert_eq!(other.step_count(), world.step_count());
}

#[test]
fn test_capture_restore_capture_is_stable() {
    let (mut world, _) = build_scene(SimulationConfig::default());
    for _ in 0..45 {
        world.step();
    }
    let blob = world.capture().unwrap();
    assert_eq!(&blob.as_bytes()[..4], &SNAPSHOT_MAGIC);
    assert_eq!(blob.version().unwrap(), FORMAT_VERSION);

    let mut fresh = World::new(SimulationConfig::default()).unwrap();
    fresh.restore(&blob).unwrap();
    assert_eq!(fresh.capture().unwrap(), blob);
    assert_eq!(fresh.body_count(), world.body_count());
    assert_eq!(fresh.contacts().len(), world.contacts().len());
    assert_eq!(fresh.joints().len(), 1);
}

#[test]
fn test_version_mismatch_leaves_world_untouched() {
    let (mut world, bodies) = build_scene(SimulationConfig::default());
    world.step();
    let before = world.capture().unwrap();

    let mut bytes = before.clone().into_bytes();
    bytes[4..8].copy_from_slice(&(FORMAT_VERSION.major as u32 + 1).to_le_bytes());
    let err = world.restore(&SnapshotBlob::from_bytes(bytes)).unwrap_err();
    assert!(matches!(err, PhysicsError::SnapshotVersionMismatch { .. }));

    let mut bytes = before.clone().into_bytes();
    bytes[1] = b'X';
    assert!(matches!(
        world.restore(&SnapshotBlob::from_bytes(bytes)),
        Err(PhysicsError::SnapshotCorrupt(_))
    ));

    let mut bytes = before.clone().into_bytes();
    bytes.truncate(bytes.len() / 2);
    assert!(matches!(
        world.restore(&SnapshotBlob::from_bytes(bytes)),
        Err(PhysicsError::SnapshotCorrupt(_))
    ));

    assert_eq!(world.capture().unwrap(), before);
    assert!(world.contains_body(bodies[0]));
}

#[test]
fn test_handles_created_after_capture_do_not_survive_restore() {
    let (mut world, bodies) = build_scene(SimulationConfig::default());
    let blob = world.capture().unwrap();

    world.destroy_body(bodies[0]).unwrap();
    let ball = world.add_shape(Shape::sphere(1.0)).unwrap();
    let newcomer = world.create_body(BodyDesc::dynamic(ball).at(0.0, 20.0, 0.0)).unwrap();
    // Reuses the freed slot
    assert_eq!(newcomer.index(), bodies[0].index());

    world.restore(&blob).unwrap();
    assert!(world.contains_body(bodies[0]));
    assert!(!world.contains_body(newcomer));
    assert!(matches!(world.body(newcomer), Err(PhysicsError::InvalidHandle { .. })));
    assert!(world.shape(ball).is_err());

    // Destroying the restored body hands its slot out again; the handle from
    // before the restore must stay dead
    let shape = world.body(bodies[0]).unwrap().shape();
    world.destroy_body(bodies[0]).unwrap();
    let reused = world.create_body(BodyDesc::dynamic(shape).at(0.0, 20.0, 0.0)).unwrap();
    assert_eq!(reused.index(), newcomer.index());
    assert_ne!(reused, newcomer);
    assert!(world.body(reused).is_ok());
    assert!(matches!(world.body(newcomer), Err(PhysicsError::InvalidHandle { .. })));
    assert!(matches!(world.destroy_body(newcomer), Err(PhysicsError::InvalidHandle { .. })));
}
