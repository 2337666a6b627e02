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
//! Character example: walking a kinematic capsule into crates
//!
//! The controller slides along a wall, pushes dynamic crates and stays
//! snapped to the floor while the world keeps stepping.

use rigid_physics::{BodyDesc, CharacterConfig, CharacterController, Point3, Shape, SimulationConfig, Vec3, World};

fn main() -> rigid_physics::Result<()> {
    println!("Rigid Physics - Character Example");
    println!("=================================\n");

    let mut world = World::new(SimulationConfig::default())?;
    let floor = world.add_shape(Shape::cuboid(20.0, 0.5, 20.0))?;
    let wall = world.add_shape(Shape::cuboid(0.5, 2.0, 10.0))?;
    let crate_shape = world.add_shape(Shape::cuboid(0.4, 0.4, 0.4))?;
    world.create_body(BodyDesc::fixed(floor).at(0.0, -0.5, 0.0))?;
    world.create_body(BodyDesc::fixed(wall).at(6.0, 2.0, 0.0))?;
    let crates: Vec<_> = (0..3)
        .map(|i| world.create_body(BodyDesc::dynamic(crate_shape).at(2.5, 0.4, -1.0 + i as f64)))
        .collect::<Result<_, _>>()?;

    let config = CharacterConfig::default();
    let start = Point3::new(0.0, config.half_height + config.radius + 0.5, 0.0);
    let mut character = CharacterController::new(&mut world, config, start)?;

    let dt = world.config().fixed_timestep;
    let walk = Vec3::new(3.0, 0.0, 1.0);
    let gravity = world.config().gravity;
    let mut fall_speed = Vec3::zeros();

    for frame in 0..180 {
        let result = character.move_and_slide(&mut world, (walk + fall_speed) * dt)?;
        fall_speed = if result.grounded { Vec3::zeros() } else { fall_speed + gravity * dt };
        world.step();
        if frame % 30 == 0 {
            let p = result.position;
            println!(
                "  frame {:3}: ({:5.2}, {:5.2}, {:5.2}) grounded: {}, {} hits",
                frame,
                p.x,
                p.y,
                p.z,
                result.grounded,
                result.hits.len()
            );
        }
    }

    println!("\nCrates after the walk:");
    for handle in crates {
        let p = world.body(handle)?.position();
        println!("  {} at ({:5.2}, {:5.2}, {:5.2})", handle, p.x, p.y, p.z);
    }
    character.destroy(&mut world)?;
    Ok(())
}
