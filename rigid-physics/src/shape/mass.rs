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
//! Mass and inertia derivation
//!
//! Inertia tensors are expressed in body space about the center of mass.

use super::Shape;
use crate::math::{Mat3, Point3, Vec3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Mass, center of mass and inertia of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    /// Mass in kilograms; 0 means infinite
    pub mass: f64,
    /// Inverse mass; 0 for static and kinematic bodies
    pub inv_mass: f64,
    /// Center of mass in body space
    pub local_center: Point3,
    /// Inertia tensor in body space
    pub inertia: Mat3,
    /// Inverse inertia tensor in body space
    pub inv_inertia: Mat3,
}

impl MassProperties {
    /// Infinite mass located at the body origin
    pub fn infinite() -> Self {
        MassProperties {
            mass: 0.0,
            inv_mass: 0.0,
            local_center: Point3::origin(),
            inertia: Mat3::zeros(),
            inv_inertia: Mat3::zeros(),
        }
    }

    /// Build from mass, center and inertia, deriving the inverses
    pub fn new(mass: f64, local_center: Point3, inertia: Mat3) -> Self {
        if !(mass > 0.0 && mass.is_finite()) {
            return MassProperties {
                local_center,
                ..MassProperties::infinite()
            };
        }
        let inv_inertia = inertia.try_inverse().unwrap_or_else(Mat3::zeros);
        MassProperties {
            mass,
            inv_mass: 1.0 / mass,
            local_center,
            inertia,
            inv_inertia,
        }
    }

    /// Same distribution rescaled to a different total mass
    pub fn with_mass(&self, mass: f64) -> Self {
        if self.mass <= 0.0 {
            return *self;
        }
        let scale = mass / self.mass;
        MassProperties::new(mass, self.local_center, self.inertia * scale)
    }

    /// Keep the center of mass but drop to infinite mass
    pub fn into_infinite(self) -> Self {
        MassProperties {
            local_center: self.local_center,
            ..MassProperties::infinite()
        }
    }

    /// Whether the mass is infinite
    pub fn is_infinite(&self) -> bool {
        self.inv_mass == 0.0
    }
}

pub(super) fn compute(shape: &Shape, density: f64) -> MassProperties {
    match shape {
        Shape::Sphere { radius } => {
            let r2 = radius * radius;
            let mass = density * 4.0 / 3.0 * PI * r2 * radius;
            let i = 0.4 * mass * r2;
            MassProperties::new(mass, Point3::origin(), Mat3::from_diagonal_element(i))
        }
        Shape::Box { half_extents } => solid_box(density, Point3::origin(), half_extents),
        Shape::Capsule {
            half_height,
            radius,
        } => {
            let r = *radius;
            let h = 2.0 * half_height;
            let r2 = r * r;
            let m_cyl = density * PI * r2 * h;
            let m_hemi = density * 2.0 / 3.0 * PI * r2 * r;
            let axial = m_cyl * r2 * 0.5 + 2.0 * m_hemi * 0.4 * r2;
            let lateral = m_cyl * (r2 * 0.25 + h * h / 12.0)
                + 2.0 * m_hemi * (0.4 * r2 + h * h * 0.25 + 0.375 * h * r);
            MassProperties::new(
                m_cyl + 2.0 * m_hemi,
                Point3::origin(),
                Mat3::from_diagonal(&Vec3::new(lateral, axial, lateral)),
            )
        }
        Shape::ConvexHull(_) => {
            let aabb = shape.local_aabb();
            solid_box(density, aabb.center(), &aabb.half_extents())
        }
        Shape::Compound(compound) => {
            let parts: Vec<(MassProperties, &crate::math::Pose)> = compound
                .children()
                .iter()
                .map(|c| (compute(&c.shape, density), &c.pose))
                .collect();
            let mass: f64 = parts.iter().map(|(p, _)| p.mass).sum();
            if mass <= 0.0 {
                return MassProperties::infinite();
            }
            let center = parts
                .iter()
                .fold(Vec3::zeros(), |acc, (p, pose)| {
                    acc + (*pose * p.local_center).coords * p.mass
                })
                / mass;
            let mut inertia = Mat3::zeros();
            for (p, pose) in &parts {
                let rot = pose.rotation.to_rotation_matrix();
                let rotated = rot.matrix() * p.inertia * rot.matrix().transpose();
                let d = (*pose * p.local_center).coords - center;
                let shift = (Mat3::identity() * d.norm_squared() - d * d.transpose()) * p.mass;
                inertia += rotated + shift;
            }
            MassProperties::new(mass, Point3::from(center), inertia)
        }
    }
}

fn solid_box(density: f64, center: Point3, h: &Vec3) -> MassProperties {
    let mass = density * 8.0 * h.x * h.y * h.z;
    let k = mass / 3.0;
    let inertia = Mat3::from_diagonal(&Vec3::new(
        k * (h.y * h.y + h.z * h.z),
        k * (h.x * h.x + h.z * h.z),
        k * (h.x * h.x + h.y * h.y),
    ));
    MassProperties::new(mass, center, inertia)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Pose;
    use crate::shape::CompoundChild;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_mass() {
        let props = Shape::sphere(1.0).mass_properties(1.0);
        assert_relative_eq!(props.mass, 4.0 / 3.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(props.inertia[(0, 0)], 0.4 * props.mass, epsilon = 1e-12);
        assert_relative_eq!(props.inv_mass * props.mass, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_box_inertia() {
        let props = Shape::cuboid(0.5, 0.5, 0.5).mass_properties(6.0);
        assert_relative_eq!(props.mass, 6.0, epsilon = 1e-12);
        // m/12 * (1 + 1) for a unit cube
        assert_relative_eq!(props.inertia[(1, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_capsule_degenerates_to_sphere() {
        let capsule = Shape::capsule(0.0, 1.0).mass_properties(1.0);
        let sphere = Shape::sphere(1.0).mass_properties(1.0);
        assert_relative_eq!(capsule.mass, sphere.mass, epsilon = 1e-12);
        assert_relative_eq!(capsule.inertia, sphere.inertia, epsilon = 1e-12);
    }

    #[test]
    fn test_compound_parallel_axis() {
        let compound = Shape::compound(vec![
            CompoundChild {
                pose: Pose::translation(-1.0, 0.0, 0.0),
                shape: Shape::sphere(0.5),
            },
            CompoundChild {
                pose: Pose::translation(1.0, 0.0, 0.0),
                shape: Shape::sphere(0.5),
            },
        ])
        .unwrap();
        let props = compound.mass_properties(1.0);
        let single = Shape::sphere(0.5).mass_properties(1.0);
        assert_relative_eq!(props.mass, 2.0 * single.mass, epsilon = 1e-12);
        assert_relative_eq!(props.local_center, Point3::origin(), epsilon = 1e-12);
        // Y inertia picks up m * d^2 for each sphere
        let expected = 2.0 * (single.inertia[(1, 1)] + single.mass);
        assert_relative_eq!(props.inertia[(1, 1)], expected, epsilon = 1e-12);
        assert_relative_eq!(props.inertia[(0, 0)], 2.0 * single.inertia[(0, 0)], epsilon = 1e-12);
    }

    #[test]
    fn test_with_mass_rescales_inertia() {
        let props = Shape::cuboid(1.0, 1.0, 1.0).mass_properties(1.0);
        let heavy = props.with_mass(props.mass * 2.0);
        assert_relative_eq!(heavy.inertia, props.inertia * 2.0, epsilon = 1e-9);
        assert!(MassProperties::infinite().is_infinite());
    }
}
