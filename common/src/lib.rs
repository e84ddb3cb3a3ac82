//! Math helpers shared by the H3D scene crates.

pub mod aabb;
pub mod transform;

pub use aabb::Aabb;
pub use transform::{
    bone_local_transform, matrix_from_3x4, matrix_to_3x4, transform_normal, transform_point,
    Matrix3x4,
};

/// Tolerance used for float comparisons across the workspace.
pub const EPSILON: f32 = 1e-6;
