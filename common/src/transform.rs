//! Transform helpers for skeleton bones.
//!
//! Bones store translation, Euler rotation (radians, applied X then Y then Z)
//! and scale. The container stores affine matrices as three rows of four
//! floats; these helpers convert between that packing and `Matrix4`.

use cgmath::{InnerSpace, Matrix4, Rad, Vector3, Vector4};

use super::EPSILON;

/// Row-major 3x4 affine matrix as stored in the container.
pub type Matrix3x4 = [[f32; 4]; 3];

// =============================================================================
// Composition
// =============================================================================

/// Builds the local transform of a bone: `T * Rz * Ry * Rx * S`.
pub fn bone_local_transform(
    translation: Vector3<f32>,
    rotation: Vector3<f32>,
    scale: Vector3<f32>,
) -> Matrix4<f32> {
    Matrix4::from_translation(translation)
        * Matrix4::from_angle_z(Rad(rotation.z))
        * Matrix4::from_angle_y(Rad(rotation.y))
        * Matrix4::from_angle_x(Rad(rotation.x))
        * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z)
}

/// Transforms a position (w = 1).
pub fn transform_point(matrix: &Matrix4<f32>, point: Vector3<f32>) -> Vector3<f32> {
    (matrix * point.extend(1.0)).truncate()
}

/// Transforms a direction (w = 0) and renormalizes it.
///
/// Degenerate results are returned unnormalized.
pub fn transform_normal(matrix: &Matrix4<f32>, normal: Vector3<f32>) -> Vector3<f32> {
    let transformed = (matrix * normal.extend(0.0)).truncate();
    if transformed.magnitude2() > EPSILON {
        transformed.normalize()
    } else {
        transformed
    }
}

// =============================================================================
// Packing
// =============================================================================

/// Packs the top three rows of an affine matrix.
pub fn matrix_to_3x4(matrix: &Matrix4<f32>) -> Matrix3x4 {
    let mut rows = [[0.0; 4]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = matrix[c][r];
        }
    }
    rows
}

/// Expands a packed 3x4 matrix, adding the implicit `[0, 0, 0, 1]` row.
pub fn matrix_from_3x4(rows: &Matrix3x4) -> Matrix4<f32> {
    let column = |c: usize| Vector4::new(rows[0][c], rows[1][c], rows[2][c], 0.0);
    let mut translation = column(3);
    translation.w = 1.0;
    Matrix4::from_cols(column(0), column(1), column(2), translation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;
    use std::f32::consts::FRAC_PI_2;

    const TEST_EPSILON: f32 = 1e-5;

    #[test]
    fn test_identity_components() {
        let m = bone_local_transform(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
        );
        assert_eq!(m, Matrix4::identity());
    }

    #[test]
    fn test_rotation_then_translation() {
        let m = bone_local_transform(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, 0.0, FRAC_PI_2),
            Vector3::new(1.0, 1.0, 1.0),
        );
        let p = transform_point(&m, Vector3::new(1.0, 0.0, 0.0));
        assert!((p.x - 1.0).abs() < TEST_EPSILON);
        assert!((p.y - 3.0).abs() < TEST_EPSILON);
        assert!((p.z - 3.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn test_normal_ignores_translation() {
        let m = Matrix4::from_translation(Vector3::new(5.0, 5.0, 5.0))
            * Matrix4::from_nonuniform_scale(2.0, 2.0, 2.0);
        let n = transform_normal(&m, Vector3::new(0.0, 1.0, 0.0));
        assert!((n.y - 1.0).abs() < TEST_EPSILON);
        assert!(n.x.abs() < TEST_EPSILON);
    }

    #[test]
    fn test_3x4_packing_round_trip() {
        let m = bone_local_transform(
            Vector3::new(1.0, -2.0, 0.5),
            Vector3::new(0.3, 0.2, 0.1),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let rows = matrix_to_3x4(&m);
        assert!((rows[0][3] - 1.0).abs() < TEST_EPSILON);
        assert!((rows[1][3] + 2.0).abs() < TEST_EPSILON);
        assert_eq!(matrix_from_3x4(&rows), m);
    }
}
