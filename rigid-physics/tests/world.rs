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
//! Integration tests for the world API: handles, queries, events and joints

use approx::assert_relative_eq;
use rigid_physics::broad_phase::{BroadPhase, Proxy};
use rigid_physics::{
    Aabb, BodyDesc, BodyHandle, BodyType, CharacterConfig, CharacterController, CollisionGroups, ContactEventKind,
    CompoundChild, JointDesc, Material, OverlapEventKind, PhysicsError, Point3, Pose, Shape, SimulationConfig, Vec3, World,
};

fn zero_gravity() -> SimulationConfig {
    SimulationConfig::default().with_gravity(Vec3::zeros())
}

/// Deterministic pseudo-random sequence in [0, 1)
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[test]
fn test_stale_body_handle_fails_everywhere() {
    let mut world = World::new(zero_gravity()).unwrap();
    let ball = world.add_shape(Shape::sphere(0.5)).unwrap();
    let body = world.create_body(BodyDesc::dynamic(ball)).unwrap();
    world.destroy_body(body).unwrap();

    let is_invalid = |r: Result<(), PhysicsError>| matches!(r, Err(PhysicsError::InvalidHandle { .. }));
    assert!(world.body(body).is_err());
    assert!(is_invalid(world.destroy_body(body)));
    assert!(is_invalid(world.set_velocity(body, Vec3::x())));
    assert!(is_invalid(world.apply_force(body, Vec3::x())));
    assert!(is_invalid(world.apply_impulse(body, Vec3::x())));
    assert!(is_invalid(world.set_pose(body, Pose::identity())));
    assert!(world.contacts_of(body).is_err());

    let reused = world.create_body(BodyDesc::dynamic(ball)).unwrap();
    assert_eq!(reused.index(), body.index());
    assert_ne!(reused.generation(), body.generation());
    assert!(world.body(body).is_err());
    assert!(world.body(reused).is_ok());
}

#[test]
fn test_shape_lives_while_referenced() {
    let mut world = World::new(zero_gravity()).unwrap();
    let cube = world.add_shape(Shape::cuboid(0.5, 0.5, 0.5)).unwrap();
    let a = world.create_body(BodyDesc::dynamic(cube)).unwrap();
    let b = world.create_body(BodyDesc::dynamic(cube).at(3.0, 0.0, 0.0)).unwrap();
    world.release_shape(cube).unwrap();
    assert!(world.shape(cube).is_ok());

    world.destroy_body(a).unwrap();
    assert!(world.shape(cube).is_ok());
    world.destroy_body(b).unwrap();
    assert!(world.shape(cube).is_err());
    assert!(world.create_body(BodyDesc::dynamic(cube)).is_err());
}

#[test]
fn test_degenerate_shapes_are_rejected() {
    let mut world = World::new(zero_gravity()).unwrap();
    assert!(matches!(
        world.add_shape(Shape::sphere(0.0)),
        Err(PhysicsError::DegenerateGeometry(_))
    ));
    assert!(matches!(
        world.add_shape(Shape::cuboid(1.0, -1.0, 1.0)),
        Err(PhysicsError::DegenerateGeometry(_))
    ));
    let flat = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
    ];
    assert!(Shape::convex_hull(flat).is_err());
}

#[test]
fn test_body_capacity_is_enforced() {
    let config = zero_gravity().with_capacity(4, 16);
    let mut world = World::new(config).unwrap();
    let ball = world.add_shape(Shape::sphere(0.1)).unwrap();
    for i in 0..4 {
        world.create_body(BodyDesc::dynamic(ball).at(i as f64, 0.0, 0.0)).unwrap();
    }
    let err = world.create_body(BodyDesc::dynamic(ball).at(9.0, 0.0, 0.0)).unwrap_err();
    assert!(matches!(err, PhysicsError::CapacityExceeded { .. }));
    assert_eq!(world.body_count(), 4);
}

#[test]
fn test_broad_phase_pairs_match_brute_force() {
    let mut tree = BroadPhase::new(0.05, 1024);
    let mut rng = Lcg(7);
    let mut leaves = Vec::new();
    for i in 0..200u32 {
        let center = Point3::new(rng.next() * 30.0, rng.next() * 30.0, rng.next() * 30.0);
        let half = Vec3::new(0.2 + rng.next(), 0.2 + rng.next(), 0.2 + rng.next());
        let proxy = Proxy {
            body: BodyHandle::new(i, 0),
            body_type: BodyType::Dynamic,
            sensor: false,
            groups: CollisionGroups::ALL,
        };
        let leaf = tree.insert(proxy, &Aabb::from_center(center, half)).unwrap();
        leaves.push(leaf);
    }
    // Move a third of them so the tree restructures
    for leaf in leaves.iter().step_by(3) {
        let center = Point3::new(rng.next() * 30.0, rng.next() * 30.0, rng.next() * 30.0);
        tree.update(*leaf, &Aabb::from_center(center, Vec3::repeat(0.6))).unwrap();
    }

    let mut expected = Vec::new();
    for i in 0..leaves.len() {
        for j in i + 1..leaves.len() {
            let (a, b) = (tree.fat_aabb(leaves[i]).unwrap(), tree.fat_aabb(leaves[j]).unwrap());
            if a.overlaps(&b) {
                expected.push((i as u32, j as u32));
            }
        }
    }
    let found: Vec<_> = tree
        .query_pairs()
        .iter()
        .map(|p| (p.body_a.index(), p.body_b.index()))
        .collect();
    assert_eq!(found, expected);
}

#[test]
fn test_separated_bodies_form_no_pairs_until_moved_together() {
    let mut world = World::new(zero_gravity()).unwrap();
    let cube = world.add_shape(Shape::cuboid(0.5, 0.5, 0.5)).unwrap();
    let mut bodies = Vec::new();
    for x in 0..5 {
        for z in 0..5 {
            let desc = BodyDesc::dynamic(cube).at(x as f64 * 3.0, 0.0, z as f64 * 3.0);
            bodies.push(world.create_body(desc).unwrap());
        }
    }
    world.step();
    assert_eq!(world.last_report().pairs_tested, 0);
    assert!(world.contacts().is_empty());

    world
        .set_pose(bodies[1], rigid_physics::Pose::translation(0.0, 0.0, 0.8))
        .unwrap();
    world.step();
    assert_eq!(world.last_report().pairs_tested, 1);
    let manifold = world.contacts().get(bodies[0], bodies[1]).unwrap();
    assert!(manifold.is_touching());
    assert_relative_eq!(manifold.normal.z, 1.0, epsilon = 1e-6);
}

#[test]
fn test_raycast_distances_are_exact() {
    let mut world = World::new(zero_gravity()).unwrap();
    let ball = world.add_shape(Shape::sphere(1.0)).unwrap();
    let cube = world.add_shape(Shape::cuboid(1.0, 2.0, 1.0)).unwrap();
    let sphere = world.create_body(BodyDesc::fixed(ball)).unwrap();
    let block = world.create_body(BodyDesc::fixed(cube).at(0.0, 0.0, 10.0)).unwrap();

    let hit = world
        .raycast(Point3::new(-10.0, 0.0, 0.0), Vec3::x(), 100.0)
        .unwrap()
        .unwrap();
    assert_eq!(hit.body, sphere);
    assert_relative_eq!(hit.distance, 9.0, epsilon = 1e-9);
    assert_relative_eq!(hit.normal, -Vec3::x(), epsilon = 1e-9);
    assert_relative_eq!(hit.point, Point3::new(-1.0, 0.0, 0.0), epsilon = 1e-9);

    // Direction need not be normalized
    let hit = world
        .raycast(Point3::new(0.0, 1.5, 0.0), Vec3::new(0.0, 0.0, 4.0), 100.0)
        .unwrap()
        .unwrap();
    assert_eq!(hit.body, block);
    assert_relative_eq!(hit.distance, 9.0, epsilon = 1e-9);
    assert_relative_eq!(hit.normal, -Vec3::z(), epsilon = 1e-9);

    assert!(world
        .raycast(Point3::new(-10.0, 0.0, 0.0), Vec3::x(), 8.5)
        .unwrap()
        .is_none());
    assert!(world
        .raycast(Point3::new(-10.0, 3.0, 0.0), Vec3::x(), 100.0)
        .unwrap()
        .is_none());

    let all = world
        .raycast_all(Point3::new(0.0, 0.0, -5.0), Vec3::z(), 100.0)
        .unwrap();
    let order: Vec<_> = all.iter().map(|h| h.body).collect();
    assert_eq!(order, vec![sphere, block]);
    assert_relative_eq!(all[0].distance, 4.0, epsilon = 1e-9);
    assert_relative_eq!(all[1].distance, 14.0, epsilon = 1e-9);
}

/// Two spheres joined at `offset` from the first
fn twin_spheres(radius: f64, offset: Vec3) -> Shape {
    Shape::compound(vec![
        CompoundChild {
            pose: Pose::identity(),
            shape: Shape::sphere(radius),
        },
        CompoundChild {
            pose: Pose::translation(offset.x, offset.y, offset.z),
            shape: Shape::sphere(radius),
        },
    ])
    .unwrap()
}

#[test]
fn test_compound_rests_on_floor_with_stable_contacts() {
    let mut world = World::new(SimulationConfig::default()).unwrap();
    let floor = world.add_shape(Shape::cuboid(10.0, 0.5, 10.0)).unwrap();
    let floor = world.create_body(BodyDesc::fixed(floor).at(0.0, -0.5, 0.0)).unwrap();
    let dumbbell = world.add_shape(twin_spheres(0.5, Vec3::new(2.0, 0.0, 0.0))).unwrap();
    let body = world.create_body(BodyDesc::dynamic(dumbbell).at(-1.0, 1.0, 0.0)).unwrap();

    for _ in 0..180 {
        world.step();
    }
    let keys = |world: &World| {
        let manifold = world.contacts().get(body, floor).unwrap();
        let mut keys: Vec<_> = manifold.points.iter().map(|p| p.key).collect();
        keys.sort_unstable();
        keys
    };
    let settled = keys(&world);
    assert_eq!(settled.len(), 2);
    assert_ne!(settled[0], settled[1]);
    assert_relative_eq!(world.body(body).unwrap().position().y, 0.5, epsilon = 0.02);

    for _ in 0..30 {
        world.step();
        assert_eq!(keys(&world), settled);
    }
    let manifold = world.contacts().get(body, floor).unwrap();
    assert!(manifold.points.iter().all(|p| p.normal_impulse > 0.0));
}

#[test]
fn test_queries_see_every_compound_child() {
    let mut world = World::new(zero_gravity()).unwrap();
    let twins = world.add_shape(twin_spheres(0.5, Vec3::new(3.0, 1.0, 0.0))).unwrap();
    let compound = world.create_body(BodyDesc::fixed(twins)).unwrap();
    let slab = world.add_shape(Shape::cuboid(5.0, 0.5, 10.0)).unwrap();
    let slab = world.create_body(BodyDesc::fixed(slab).at(0.0, -5.0, 0.0)).unwrap();

    // The first child is nearest but the sweep passes above it
    let hit = world
        .shape_cast(&Shape::sphere(0.25), &Pose::translation(0.0, 1.0, 0.0), Vec3::x(), 10.0)
        .unwrap()
        .unwrap();
    assert_eq!(hit.body, compound);
    assert_relative_eq!(hit.distance, 2.25, epsilon = 1e-5);

    let hit = world.raycast(Point3::new(0.0, 1.0, 0.0), Vec3::x(), 10.0).unwrap().unwrap();
    assert_eq!(hit.body, compound);
    assert_relative_eq!(hit.distance, 2.5, epsilon = 1e-9);

    assert_eq!(world.overlap(&Shape::sphere(0.2), &Pose::translation(3.0, 1.4, 0.0)).unwrap(), vec![compound]);
    assert!(world.overlap(&Shape::sphere(0.2), &Pose::translation(1.5, 0.5, 0.0)).unwrap().is_empty());

    // A compound can be the moving shape too
    let dumbbell = twin_spheres(0.5, Vec3::new(2.0, 0.0, 0.0));
    let hit = world
        .shape_cast(&dumbbell, &Pose::translation(-1.0, 5.0, 4.0), -Vec3::y(), 10.0)
        .unwrap()
        .unwrap();
    assert_eq!(hit.body, slab);
    assert_relative_eq!(hit.distance, 9.0, epsilon = 1e-5);
    assert_relative_eq!(hit.normal, Vec3::y(), epsilon = 1e-9);
}

#[test]
fn test_contact_events_follow_touching_state() {
    let mut world = World::new(SimulationConfig::default()).unwrap();
    let floor = world.add_shape(Shape::cuboid(10.0, 0.5, 10.0)).unwrap();
    let ball = world.add_shape(Shape::sphere(0.5)).unwrap();
    let ground = world.create_body(BodyDesc::fixed(floor).at(0.0, -0.5, 0.0)).unwrap();
    let body = world.create_body(BodyDesc::dynamic(ball).at(0.0, 1.5, 0.0)).unwrap();

    let mut kinds = Vec::new();
    for _ in 0..120 {
        world.step();
        for event in world.drain_events().contacts {
            assert_eq!((event.body_a, event.body_b), (ground, body));
            kinds.push(event.kind);
        }
    }
    assert_eq!(kinds.first(), Some(&ContactEventKind::Begin));
    assert_eq!(kinds.last(), Some(&ContactEventKind::Persist));

    world.destroy_body(body).unwrap();
    let events = world.drain_events();
    assert_eq!(events.contacts.len(), 1);
    assert_eq!(events.contacts[0].kind, ContactEventKind::End);
    assert!(world.events().is_empty());
}

#[test]
fn test_sensor_reports_overlap_without_contact() {
    let mut world = World::new(SimulationConfig::default()).unwrap();
    let region = world.add_shape(Shape::cuboid(2.0, 0.5, 2.0)).unwrap();
    let ball = world.add_shape(Shape::sphere(0.25)).unwrap();
    let sensor = world
        .create_body(BodyDesc::fixed(region).at(0.0, 1.0, 0.0).sensor(true))
        .unwrap();
    let body = world.create_body(BodyDesc::dynamic(ball).at(0.0, 3.0, 0.0)).unwrap();

    let mut overlaps = Vec::new();
    for _ in 0..90 {
        world.step();
        assert!(world.contacts().is_empty());
        overlaps.extend(world.drain_events().overlaps);
    }
    let kinds: Vec<_> = overlaps.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![OverlapEventKind::Begin, OverlapEventKind::End]);
    assert_eq!((overlaps[0].body_a, overlaps[0].body_b), (sensor, body));
    // Fell straight through
    assert!(world.body(body).unwrap().position().y < 0.0);
}

#[test]
fn test_pendulum_keeps_its_length() {
    let mut world = World::new(SimulationConfig::default()).unwrap();
    let small = world.add_shape(Shape::sphere(0.1)).unwrap();
    let pivot = world.create_body(BodyDesc::fixed(small).at(0.0, 5.0, 0.0)).unwrap();
    let bob = world.create_body(BodyDesc::dynamic(small).at(2.0, 5.0, 0.0)).unwrap();
    world
        .create_joint(JointDesc::point(pivot, bob).with_anchors(Point3::origin(), Point3::new(-2.0, 0.0, 0.0)))
        .unwrap();

    let mut lowest = f64::MAX;
    for _ in 0..240 {
        world.step();
        let p = world.body(bob).unwrap().position();
        lowest = lowest.min(p.y);
        let length = (p - Point3::new(0.0, 5.0, 0.0)).norm();
        assert_relative_eq!(length, 2.0, epsilon = 0.05);
    }
    assert!(lowest < 3.2, "bob never swung down: {}", lowest);
}

#[test]
fn test_hinge_allows_only_its_axis() {
    let mut world = World::new(SimulationConfig::default().with_solver_iterations(16)).unwrap();
    let small = world.add_shape(Shape::sphere(0.1)).unwrap();
    let plank = world.add_shape(Shape::cuboid(0.1, 0.5, 0.1)).unwrap();
    let pivot = world
        .create_body(BodyDesc::fixed(small).at(0.0, 5.0, 0.0).with_groups(CollisionGroups::new(1, 0)))
        .unwrap();
    let arm = world
        .create_body(
            BodyDesc::dynamic(plank)
                .at(0.0, 4.5, 0.0)
                .with_velocity(Vec3::new(1.0, 0.0, 2.0)),
        )
        .unwrap();
    world
        .create_joint(JointDesc::hinge(pivot, arm).with_anchors(Point3::origin(), Point3::new(0.0, 0.5, 0.0)))
        .unwrap();

    for _ in 0..120 {
        world.step();
    }
    let body = world.body(arm).unwrap();
    // Swinging in the y-z plane only
    assert!(body.position().x.abs() < 0.05, "x drifted to {}", body.position().x);
    assert!(body.angular_velocity().y.abs() < 0.05);
    assert!(body.angular_velocity().z.abs() < 0.05);
    assert_relative_eq!((body.position() - Point3::new(0.0, 5.0, 0.0)).norm(), 0.5, epsilon = 0.05);
}

#[test]
fn test_slider_respects_limits() {
    let config = SimulationConfig::default().with_gravity(Vec3::new(-9.81, -9.81, 0.0));
    let mut world = World::new(config).unwrap();
    let rail_shape = world.add_shape(Shape::cuboid(0.1, 0.1, 0.1)).unwrap();
    let rail = world
        .create_body(BodyDesc::fixed(rail_shape).with_groups(CollisionGroups::new(1, 0)))
        .unwrap();
    let cart = world.create_body(BodyDesc::dynamic(rail_shape)).unwrap();
    world
        .create_joint(JointDesc::slider(rail, cart).with_limits(-0.5, 0.5))
        .unwrap();

    for _ in 0..180 {
        world.step();
    }
    let p = world.body(cart).unwrap().position();
    assert_relative_eq!(p.x, -0.5, epsilon = 0.05);
    assert!(p.y.abs() < 0.01 && p.z.abs() < 0.01, "cart left the rail: {:?}", p);
}

#[test]
fn test_destroying_a_body_removes_its_joints() {
    let mut world = World::new(zero_gravity()).unwrap();
    let ball = world.add_shape(Shape::sphere(0.2)).unwrap();
    let a = world.create_body(BodyDesc::dynamic(ball)).unwrap();
    let b = world.create_body(BodyDesc::dynamic(ball).at(1.0, 0.0, 0.0)).unwrap();
    let joint = world.create_joint(JointDesc::fixed(a, b)).unwrap();
    assert!(world.create_joint(JointDesc::point(a, a)).is_err());

    world.destroy_body(b).unwrap();
    assert!(world.joint(joint).is_err());
    assert!(world.joints().is_empty());
    assert!(world.create_joint(JointDesc::point(a, b)).is_err());
}

#[test]
fn test_destroy_joint_frees_the_bodies() {
    let mut world = World::new(zero_gravity()).unwrap();
    let ball = world.add_shape(Shape::sphere(0.2)).unwrap();
    let a = world.create_body(BodyDesc::dynamic(ball)).unwrap();
    let b = world.create_body(BodyDesc::dynamic(ball).at(1.0, 0.0, 0.0)).unwrap();
    let joint = world.create_joint(JointDesc::point(a, b)).unwrap();

    world.destroy_joint(joint).unwrap();
    assert!(world.joint(joint).is_err());
    assert!(matches!(world.destroy_joint(joint), Err(PhysicsError::InvalidHandle { .. })));

    world.set_velocity(b, Vec3::x()).unwrap();
    for _ in 0..10 {
        world.step();
    }
    assert_relative_eq!(world.body(a).unwrap().position().x, 0.0, epsilon = 1e-9);
    assert!(world.body(b).unwrap().position().x > 1.1);
}

#[test]
fn test_forces_and_torques_last_one_step() {
    let mut world = World::new(zero_gravity()).unwrap();
    let ball = world.add_shape(Shape::sphere(0.5)).unwrap();
    let light = world
        .create_body(BodyDesc::dynamic(ball).with_material(Material::default().with_density(1.0)))
        .unwrap();
    let heavy = world
        .create_body(BodyDesc::dynamic(ball).at(5.0, 0.0, 0.0).with_material(Material::default().with_density(3.0)))
        .unwrap();
    let ground = world.create_body(BodyDesc::fixed(ball).at(0.0, -5.0, 0.0)).unwrap();
    assert_relative_eq!(
        world.body(heavy).unwrap().mass(),
        3.0 * world.body(light).unwrap().mass(),
        max_relative = 1e-9
    );

    world.apply_torque(light, Vec3::z()).unwrap();
    world.apply_force_at_point(heavy, Vec3::x(), Point3::new(5.0, 0.5, 0.0)).unwrap();
    world.step();

    let spun = world.body(light).unwrap();
    assert!(spun.angular_velocity().z > 0.0);
    assert_relative_eq!(spun.linear_velocity().norm(), 0.0, epsilon = 1e-12);
    let pushed = world.body(heavy).unwrap();
    assert!(pushed.linear_velocity().x > 0.0);
    assert!(pushed.angular_velocity().z < 0.0);

    let spin = world.body(light).unwrap().angular_velocity();
    world.step();
    assert_relative_eq!(world.body(light).unwrap().angular_velocity(), spin, epsilon = 1e-12);

    assert!(matches!(
        world.apply_torque(ground, Vec3::z()),
        Err(PhysicsError::InvalidOperation(_))
    ));
}

#[test]
fn test_gravity_can_change_between_steps() {
    let mut world = World::new(zero_gravity()).unwrap();
    let ball = world.add_shape(Shape::sphere(0.5)).unwrap();
    let body = world.create_body(BodyDesc::dynamic(ball)).unwrap();
    world.step();
    assert_relative_eq!(world.body(body).unwrap().linear_velocity().y, 0.0);

    world.set_gravity(Vec3::new(0.0, -10.0, 0.0));
    world.step();
    assert!(world.body(body).unwrap().linear_velocity().y < 0.0);
}

#[test]
fn test_kinematic_target_is_reached_in_one_step() {
    let mut world = World::new(zero_gravity()).unwrap();
    let cube = world.add_shape(Shape::cuboid(0.5, 0.5, 0.5)).unwrap();
    let platform = world.create_body(BodyDesc::kinematic(cube)).unwrap();
    let crate_body = world.create_body(BodyDesc::dynamic(cube).at(0.0, 5.0, 0.0)).unwrap();

    world
        .set_kinematic_target(platform, Pose::translation(0.1, 0.0, 0.0))
        .unwrap();
    world.step();
    assert_relative_eq!(world.body(platform).unwrap().position().x, 0.1, epsilon = 1e-9);

    world.step();
    assert_relative_eq!(world.body(platform).unwrap().position().x, 0.1, epsilon = 1e-9);
    assert_relative_eq!(world.body(platform).unwrap().linear_velocity().norm(), 0.0);

    assert!(matches!(
        world.set_kinematic_target(crate_body, Pose::identity()),
        Err(PhysicsError::InvalidOperation(_))
    ));
}

#[test]
fn test_update_runs_whole_fixed_steps_and_carries_the_rest() {
    let dt = 0.0625;
    let mut world = World::new(zero_gravity().with_timestep(dt)).unwrap();

    assert_eq!(world.update(dt / 2.0), 0);
    assert_eq!(world.step_count(), 0);
    assert_eq!(world.accumulator(), dt / 2.0);

    assert_eq!(world.update(dt / 2.0), 1);
    assert_eq!(world.step_count(), 1);
    assert_eq!(world.accumulator(), 0.0);

    assert_eq!(world.update(3.0 * dt + dt / 2.0), 3);
    assert_eq!(world.step_count(), 4);
    assert_eq!(world.accumulator(), dt / 2.0);
}

#[test]
fn test_update_caps_a_stall_and_drops_the_backlog() {
    let dt = 0.0625;
    let mut config = zero_gravity().with_timestep(dt);
    config.max_steps_per_update = 8;
    let mut world = World::new(config).unwrap();

    assert_eq!(world.update(100.0 * dt + dt / 2.0), 8);
    assert_eq!(world.step_count(), 8);
    // Only the fractional step survives
    assert_eq!(world.accumulator(), dt / 2.0);

    assert_eq!(world.update(dt / 2.0), 1);
    assert_eq!(world.step_count(), 9);
}

#[test]
fn test_update_ignores_invalid_elapsed_time() {
    let dt = 0.0625;
    let mut world = World::new(zero_gravity().with_timestep(dt)).unwrap();
    world.update(dt / 2.0);

    for elapsed in [-1.0, f64::NAN, f64::INFINITY] {
        assert_eq!(world.update(elapsed), 0);
    }
    assert_eq!(world.step_count(), 0);
    assert_eq!(world.accumulator(), dt / 2.0);
}

#[test]
fn test_character_walks_across_floor() {
    let mut world = World::new(SimulationConfig::default()).unwrap();
    let floor = world.add_shape(Shape::cuboid(20.0, 0.5, 20.0)).unwrap();
    world.create_body(BodyDesc::fixed(floor).at(0.0, -0.5, 0.0)).unwrap();

    let config = CharacterConfig::default();
    let standing = config.half_height + config.radius + config.skin_width;
    let mut character = CharacterController::new(&mut world, config, Point3::new(0.0, standing + 0.5, 0.0)).unwrap();
    for _ in 0..60 {
        character
            .move_and_slide(&mut world, Vec3::new(0.05, -0.1, 0.0))
            .unwrap();
        world.step();
    }
    let p = character.position(&world).unwrap();
    assert!(character.is_grounded());
    assert_relative_eq!(p.x, 3.0, epsilon = 0.05);
    assert_relative_eq!(p.y, standing, epsilon = 1e-3);
}

#[test]
fn test_config_round_trips_through_json() {
    let config = SimulationConfig::default()
        .with_timestep(1.0 / 120.0)
        .with_solver_iterations(16);
    let json = serde_json::to_string(&config).unwrap();
    let parsed: SimulationConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);

    // Missing fields fall back to defaults
    let partial: SimulationConfig = serde_json::from_str(r#"{ "solver_iterations": 4 }"#).unwrap();
    assert_eq!(partial.solver_iterations, 4);
    assert_eq!(partial.fixed_timestep, SimulationConfig::default().fixed_timestep);

    let bad = SimulationConfig::default().with_timestep(0.0);
    assert!(matches!(World::new(bad), Err(PhysicsError::InvalidConfig(_))));
}
