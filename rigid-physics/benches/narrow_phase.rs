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
//! Benchmarks for pairwise collision detection
//!
//! Analytic pairs are compared against the GJK/EPA path on hulls.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rigid_physics::narrow_phase::{distance, test_pair, NarrowPhaseConfig};
use rigid_physics::{Point3, Pose, Quat, Shape, Vec3};

fn cube_hull(h: f64) -> Shape {
    let mut points = Vec::with_capacity(8);
    for x in [-h, h] {
        for y in [-h, h] {
            for z in [-h, h] {
                points.push(Point3::new(x, y, z));
            }
        }
    }
    Shape::convex_hull(points).expect("cube hull is valid")
}

fn tilted(x: f64, y: f64, z: f64) -> Pose {
    Pose::from_parts(
        Vec3::new(x, y, z).into(),
        Quat::from_euler_angles(0.3, 0.2, 0.1),
    )
}

fn bench_analytic(c: &mut Criterion) {
    let config = NarrowPhaseConfig::default();
    let mut group = c.benchmark_group("narrow_phase_analytic");

    let ball = Shape::sphere(0.5);
    group.bench_function("sphere_sphere", |b| {
        let (pa, pb) = (Pose::identity(), Pose::translation(0.9, 0.1, 0.0));
        b.iter(|| black_box(test_pair(&ball, &pa, &ball, &pb, &config)));
    });

    let cube = Shape::cuboid(0.5, 0.5, 0.5);
    let floor = Shape::cuboid(10.0, 0.5, 10.0);
    group.bench_function("box_box_resting", |b| {
        let (pa, pb) = (Pose::translation(0.0, -0.5, 0.0), Pose::translation(0.0, 0.49, 0.0));
        b.iter(|| black_box(test_pair(&floor, &pa, &cube, &pb, &config)));
    });

    group.bench_function("box_box_tilted", |b| {
        let (pa, pb) = (Pose::identity(), tilted(0.0, 0.95, 0.0));
        b.iter(|| black_box(test_pair(&cube, &pa, &cube, &pb, &config)));
    });

    let pill = Shape::capsule(0.5, 0.25);
    group.bench_function("capsule_box", |b| {
        let (pa, pb) = (Pose::translation(0.0, -0.5, 0.0), tilted(0.0, 0.7, 0.0));
        b.iter(|| black_box(test_pair(&floor, &pa, &pill, &pb, &config)));
    });

    group.finish();
}

fn bench_iterative(c: &mut Criterion) {
    let config = NarrowPhaseConfig::default();
    let mut group = c.benchmark_group("narrow_phase_gjk_epa");
    let hull = cube_hull(0.5);

    group.bench_function("hull_hull_separated", |b| {
        let (pa, pb) = (Pose::identity(), tilted(2.0, 0.3, 0.0));
        b.iter(|| black_box(distance(&hull, &pa, &hull, &pb, &config)));
    });

    group.bench_function("hull_hull_penetrating", |b| {
        let (pa, pb) = (Pose::identity(), tilted(0.8, 0.1, 0.0));
        b.iter(|| black_box(test_pair(&hull, &pa, &hull, &pb, &config)));
    });

    let ball = Shape::sphere(0.4);
    group.bench_function("hull_sphere", |b| {
        let (pa, pb) = (tilted(0.0, 0.0, 0.0), Pose::translation(0.0, 0.85, 0.0));
        b.iter(|| black_box(test_pair(&hull, &pa, &ball, &pb, &config)));
    });

    group.finish();
}

criterion_group!(benches, bench_analytic, bench_iterative);
criterion_main!(benches);
