//! SE3: 6-DOF rigid body transformation (rotation + translation).
//!
//! Poses in this crate are stored as `T_world_local` (local-to-world), e.g. a
//! frame's `robot_to_world` or a local map's `local_map_to_world`. Tangent
//! vectors are ordered `[φ (3), ρ (3)]`, rotation first.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Rotation3, UnitQuaternion, Vector3, Vector6};

use super::so3::{left_jacobian_so3, left_jacobian_so3_inv};

/// Rigid body transformation: p' = R * p + t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Construct from a rotation matrix and translation.
    ///
    /// The matrix is re-orthonormalized through the quaternion conversion.
    pub fn from_rotation_matrix(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix(&rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from the row-major 3x4 block `[R | t]` (KITTI pose line layout).
    pub fn from_row_major_3x4(values: &[f64; 12]) -> Self {
        let block = Matrix3x4::from_row_slice(values);
        let rotation = block.fixed_view::<3, 3>(0, 0).into_owned();
        let translation = block.column(3).into_owned();
        Self::from_rotation_matrix(rotation, translation)
    }

    /// Homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.to_rotation_matrix().matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    /// The 3x4 block `[R | t]`.
    pub fn to_matrix_3x4(&self) -> Matrix3x4<f64> {
        self.to_matrix().fixed_view::<3, 4>(0, 0).into_owned()
    }

    /// Inverse transformation: `[Rᵀ | -Rᵀ t]`.
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: self ∘ other.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a single point: p' = R * p + t.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Magnitude of the rotation (angle-axis norm) in radians.
    pub fn rotation_angle(&self) -> f64 {
        self.rotation.angle()
    }

    /// Logarithm map to `[φ, ρ]` with `t = Jl(φ) ρ`.
    pub fn log(&self) -> Vector6<f64> {
        let phi = self.rotation.scaled_axis();
        let rho = left_jacobian_so3_inv(&phi) * self.translation;
        Vector6::new(phi.x, phi.y, phi.z, rho.x, rho.y, rho.z)
    }

    /// Exponential map from `[φ, ρ]`.
    pub fn exp(tangent: &Vector6<f64>) -> Self {
        let phi = Vector3::new(tangent[0], tangent[1], tangent[2]);
        let rho = Vector3::new(tangent[3], tangent[4], tangent[5]);
        Self {
            rotation: UnitQuaternion::from_scaled_axis(phi),
            translation: left_jacobian_so3(&phi) * rho,
        }
    }

    /// Right-hand retraction: self ∘ exp(δ).
    pub fn retract(&self, delta: &Vector6<f64>) -> Self {
        self.compose(&Self::exp(delta))
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}
