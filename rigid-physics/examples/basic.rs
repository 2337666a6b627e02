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
//! Basic example: a box pile settling on a floor
//!
//! Creates a world, drops a few boxes and spheres, steps it with the
//! fixed-timestep accumulator and prints contact events and a raycast.

use rigid_physics::{BodyDesc, ContactEventKind, Material, Point3, Shape, SimulationConfig, Vec3, World};

fn main() -> rigid_physics::Result<()> {
    println!("Rigid Physics - Basic Example");
    println!("=============================\n");

    let mut world = World::new(SimulationConfig::default())?;
    let floor = world.add_shape(Shape::cuboid(10.0, 0.5, 10.0))?;
    let cube = world.add_shape(Shape::cuboid(0.5, 0.5, 0.5))?;
    let ball = world.add_shape(Shape::sphere(0.4))?;

    let ground = world.create_body(BodyDesc::fixed(floor).at(0.0, -0.5, 0.0))?;
    println!("Created floor {}", ground);

    let bouncy = Material::new(0.4, 0.6);
    let mut bodies = Vec::new();
    for i in 0..4 {
        let y = 1.0 + i as f64 * 1.2;
        bodies.push(world.create_body(BodyDesc::dynamic(cube).at(0.0, y, 0.0))?);
        bodies.push(world.create_body(BodyDesc::dynamic(ball).at(2.0, y, 0.3).with_material(bouncy))?);
    }
    println!("Created {} dynamic bodies\n", bodies.len());

    // Feed two seconds of 1/30 s frames through the accumulator
    let mut steps = 0;
    for frame in 0..60 {
        steps += world.update(1.0 / 30.0);
        for event in world.drain_events().contacts {
            if event.kind != ContactEventKind::Persist {
                println!(
                    "  frame {:2}: {:?} {} / {} (depth {:.4})",
                    frame, event.kind, event.body_a, event.body_b, event.manifold.max_depth
                );
            }
        }
    }

    println!("\nAfter {} steps:", steps);
    for handle in &bodies {
        let body = world.body(*handle)?;
        let p = body.position();
        println!("  {} at ({:6.3}, {:6.3}, {:6.3})", handle, p.x, p.y, p.z);
    }
    let report = world.last_report();
    println!(
        "\nLast step: {} pairs, {} manifolds, {} points, {} solver iterations",
        report.pairs_tested, report.manifolds, report.contact_points, report.solver.iterations_used
    );
    println!("Kinetic energy: {:.6} J", world.kinetic_energy());

    if let Some(hit) = world.raycast(Point3::new(0.0, 10.0, 0.0), -Vec3::y(), 20.0)? {
        println!("\nRay from above hits {} at height {:.3}", hit.body, hit.point.y);
    }
    Ok(())
}
